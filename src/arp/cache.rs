//! Fixed 8-slot ARP cache with LRU replacement and age-based expiry.
//!
//! Mirrors the teacher's habit of keeping all protocol state in fixed-size
//! structs (`FilterStats`, `DhcpClient`) rather than reaching for a heap
//! collection — every slot here is a plain array element, never allocated.

use crate::host::Ip4Addr;

pub const CACHE_SIZE: usize = 8;
/// An entry older than this is treated as stale and re-resolved.
pub const STALE_AFTER_MS: u32 = 20 * 60 * 1000;

const ZERO_IP: Ip4Addr = [0u8; 4];
const ZERO_MAC: [u8; 6] = [0u8; 6];

/// One 14-byte cache record: `{ip[4], mac[6], ts[4]}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ip4Addr,
    pub mac: [u8; 6],
    pub ts_ms: u32,
}

impl ArpEntry {
    const fn empty(ts_ms: u32) -> Self {
        Self {
            ip: ZERO_IP,
            mac: ZERO_MAC,
            ts_ms,
        }
    }

    fn is_empty(&self) -> bool {
        self.ip == ZERO_IP
    }

    fn age_ms(&self, now: u32) -> u32 {
        now.wrapping_sub(self.ts_ms)
    }

    fn is_stale(&self, now: u32) -> bool {
        self.age_ms(now) > STALE_AFTER_MS
    }
}

/// Classification returned by `lookup`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArpState {
    /// No entry for this IP; the returned slot index is the LRU victim.
    Miss,
    /// Entry exists but has no MAC yet (request sent, reply pending) or has
    /// aged past `STALE_AFTER_MS`.
    Partial,
    /// Entry has a MAC and is not yet stale.
    Complete,
}

/// The 8-entry ARP cache. Every access — read or write — must happen while
/// holding the mutex this is wrapped in (`NetStack::arp_cache`).
pub struct ArpCache {
    entries: [ArpEntry; CACHE_SIZE],
}

impl ArpCache {
    pub const fn new() -> Self {
        Self {
            entries: [ArpEntry::empty(0); CACHE_SIZE],
        }
    }

    /// Zero the cache and stamp every slot with `now` so nothing looks
    /// artificially stale right after boot.
    pub fn init(&mut self, now: u32) {
        self.entries = [ArpEntry::empty(now); CACHE_SIZE];
    }

    /// Look up `ip`. Returns the slot index and its classification. On a
    /// miss the returned slot is the least-recently-used one (the slot with
    /// the greatest `now - ts`, scanned starting from slot 0).
    pub fn lookup(&self, ip: &Ip4Addr, now: u32) -> (usize, ArpState) {
        for (i, e) in self.entries.iter().enumerate() {
            if !e.is_empty() && &e.ip == ip {
                let state = if e.mac == ZERO_MAC || e.is_stale(now) {
                    ArpState::Partial
                } else {
                    ArpState::Complete
                };
                return (i, state);
            }
        }
        let mut lru = 0usize;
        let mut lru_age = self.entries[0].age_ms(now);
        for i in 1..CACHE_SIZE {
            let age = self.entries[i].age_ms(now);
            if age > lru_age {
                lru_age = age;
                lru = i;
            }
        }
        (lru, ArpState::Miss)
    }

    /// Record an authoritative sender IP/MAC pair parsed from an inbound
    /// ARP frame: always refresh the MAC and timestamp; if the lookup was a
    /// miss, claim the LRU slot for this IP as well.
    pub fn update_from_frame(&mut self, sender_ip: &Ip4Addr, sender_mac: &[u8; 6], now: u32) {
        let (slot, state) = self.lookup(sender_ip, now);
        let entry = &mut self.entries[slot];
        if state == ArpState::Miss {
            entry.ip = *sender_ip;
        }
        entry.mac = *sender_mac;
        entry.ts_ms = now;
    }

    /// Record that a request was just sent for `ip`, creating a partial
    /// entry (zero MAC) if none existed, or refreshing the timestamp of an
    /// existing one so it isn't immediately evicted while a reply is
    /// pending.
    pub fn mark_pending(&mut self, ip: &Ip4Addr, now: u32) {
        let (slot, state) = self.lookup(ip, now);
        let entry = &mut self.entries[slot];
        if state == ArpState::Miss {
            entry.ip = *ip;
            entry.mac = ZERO_MAC;
        }
        entry.ts_ms = now;
    }

    pub fn entry(&self, slot: usize) -> &ArpEntry {
        &self.entries[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArpEntry> {
        self.entries.iter().filter(|e| !e.is_empty())
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_insert_then_complete() {
        let mut c = ArpCache::new();
        c.init(0);
        let ip = [192, 168, 1, 101];
        let (_, state) = c.lookup(&ip, 100);
        assert_eq!(state, ArpState::Miss);
        c.update_from_frame(&ip, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF], 100);
        let (_, state) = c.lookup(&ip, 200);
        assert_eq!(state, ArpState::Complete);
    }

    #[test]
    fn partial_entry_has_zero_mac() {
        let mut c = ArpCache::new();
        c.init(0);
        let ip = [10, 0, 0, 5];
        c.mark_pending(&ip, 10);
        let (_, state) = c.lookup(&ip, 20);
        assert_eq!(state, ArpState::Partial);
    }

    #[test]
    fn entry_older_than_twenty_minutes_reverts_to_stale_partial() {
        let mut c = ArpCache::new();
        c.init(0);
        let ip = [10, 0, 0, 9];
        c.update_from_frame(&ip, &[1, 2, 3, 4, 5, 6], 1_000);
        let (_, fresh) = c.lookup(&ip, 1_000 + STALE_AFTER_MS);
        assert_eq!(fresh, ArpState::Complete);
        let (_, stale) = c.lookup(&ip, 1_000 + STALE_AFTER_MS + 1);
        assert_eq!(stale, ArpState::Partial);
    }

    #[test]
    fn at_most_one_entry_per_ip() {
        let mut c = ArpCache::new();
        c.init(0);
        let ip = [1, 2, 3, 4];
        c.update_from_frame(&ip, &[1, 1, 1, 1, 1, 1], 5);
        c.update_from_frame(&ip, &[2, 2, 2, 2, 2, 2], 6);
        let count = c.iter().filter(|e| e.ip == ip).count();
        assert_eq!(count, 1);
        let (slot, _) = c.lookup(&ip, 7);
        assert_eq!(c.entry(slot).mac, [2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn full_cache_of_partials_replaces_the_oldest_one() {
        let mut c = ArpCache::new();
        c.init(0);
        for i in 0..CACHE_SIZE {
            let ip = [10, 0, 0, i as u8];
            // stagger timestamps so slot `i` is the i-th oldest
            c.mark_pending(&ip, (i as u32) * 10);
        }
        // slot 0 (ip 10.0.0.0) has the smallest timestamp, so it is the LRU victim.
        let (lru_slot, state) = c.lookup(&[10, 0, 0, 99], 1000);
        assert_eq!(state, ArpState::Miss);
        assert_eq!(c.entry(lru_slot).ip, [10, 0, 0, 0]);
    }

    #[test]
    fn tick_wraparound_does_not_make_a_fresh_entry_look_stale() {
        let mut c = ArpCache::new();
        let just_before_wrap = u32::MAX - 5;
        c.init(just_before_wrap);
        let ip = [172, 16, 0, 1];
        c.update_from_frame(&ip, &[9, 9, 9, 9, 9, 9], just_before_wrap);
        // a few ms after wraparound
        let after_wrap = 3u32;
        let (_, state) = c.lookup(&ip, after_wrap);
        assert_eq!(state, ArpState::Complete);
    }

    #[test]
    fn active_entry_is_not_the_lru_victim() {
        let mut c = ArpCache::new();
        c.init(0);
        // fill all 8 slots, then touch slot for ip .1 most recently
        for i in 0..CACHE_SIZE {
            c.update_from_frame(&[10, 0, 0, i as u8], &[1, 2, 3, 4, 5, i as u8], (i as u32) * 100);
        }
        c.update_from_frame(&[10, 0, 0, 1], &[1, 2, 3, 4, 5, 1], 10_000);
        let (lru_slot, state) = c.lookup(&[10, 0, 0, 200], 10_001);
        assert_eq!(state, ArpState::Miss);
        assert_ne!(c.entry(lru_slot).ip, [10, 0, 0, 1]);
    }
}
