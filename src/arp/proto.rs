//! ARP protocol: request/reply/gratuitous frame construction, inbound frame
//! classification, and the resolve-with-retry path used by the send side.

use super::cache::{ArpCache, ArpState};
use crate::host::{Ip4Addr, MacAddr, BROADCAST_MAC};
use crate::task::{Clock, Scheduler};
use spin::Mutex;

/// Everything `spec.md` §3/§5 requires the ARP mutex to guard: the cache
/// itself and the one shared outbound ARP staging buffer. Both the RX
/// task's replies and the send path's requests are built into
/// `request_frame` while holding this same lock, matching "arp_frame,
/// arp_cache, all ARP read/write operations — guarded by arp_mutex".
pub struct ArpShared {
    pub cache: ArpCache,
    pub request_frame: [u8; ARP_FRAME_LEN],
}

impl ArpShared {
    pub const fn new() -> Self {
        Self {
            cache: ArpCache::new(),
            request_frame: [0u8; ARP_FRAME_LEN],
        }
    }

    /// Zero the cache and stamp every slot with `now` (`spec.md` §3
    /// lifecycle note: done once at RX-task start).
    pub fn init(&mut self, now_ms: u32) {
        self.cache.init(now_ms);
    }
}

impl Default for ArpShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Offsets into the 42-byte ARP-over-Ethernet frame.
pub const ARP_FRAME_LEN: usize = 42;
const ETH_DST: core::ops::Range<usize> = 0..6;
const ETH_SRC: core::ops::Range<usize> = 6..12;
const ETH_TYPE: core::ops::Range<usize> = 12..14;
const ARP_HEADER: core::ops::Range<usize> = 14..20;
const ARP_OPER: core::ops::Range<usize> = 20..22;
const ARP_SHA: core::ops::Range<usize> = 22..28;
const ARP_SPA: core::ops::Range<usize> = 28..32;
const ARP_THA: core::ops::Range<usize> = 32..38;
const ARP_TPA: core::ops::Range<usize> = 38..42;

/// `{hardware=Ethernet, protocol=IPv4, hlen=6, plen=4}`.
const CANONICAL_ARP_HEADER: [u8; 6] = [0x00, 0x01, 0x08, 0x00, 0x06, 0x04];
pub const ETHERTYPE_ARP: [u8; 2] = [0x08, 0x06];

const OP_REQUEST: u16 = 1;
const OP_REPLY: u16 = 2;

fn fill_common(buf: &mut [u8], oper: u16, host_mac: &MacAddr, host_ip: &Ip4Addr) {
    buf[ARP_HEADER].copy_from_slice(&CANONICAL_ARP_HEADER);
    buf[ARP_OPER].copy_from_slice(&oper.to_be_bytes());
    buf[ARP_SHA].copy_from_slice(host_mac);
    buf[ARP_SPA].copy_from_slice(host_ip);
}

/// Build an ARP request for `target_ip` into `buf` (must be at least
/// `ARP_FRAME_LEN` bytes). Returns the frame length.
pub fn build_request(buf: &mut [u8], host_mac: &MacAddr, host_ip: &Ip4Addr, target_ip: &Ip4Addr) -> usize {
    buf[ETH_DST].copy_from_slice(&BROADCAST_MAC);
    buf[ETH_SRC].copy_from_slice(host_mac);
    buf[ETH_TYPE].copy_from_slice(&ETHERTYPE_ARP);
    fill_common(buf, OP_REQUEST, host_mac, host_ip);
    buf[ARP_THA].fill(0);
    buf[ARP_TPA].copy_from_slice(target_ip);
    ARP_FRAME_LEN
}

/// Build a gratuitous ARP (a request asking "who has my own IP").
pub fn build_gratuitous(buf: &mut [u8], host_mac: &MacAddr, host_ip: &Ip4Addr) -> usize {
    build_request(buf, host_mac, host_ip, host_ip)
}

/// Build a reply to an inbound ARP request `req` (the raw incoming frame):
/// the target fields are copied verbatim from the request's sender fields.
pub fn build_reply(buf: &mut [u8], host_mac: &MacAddr, host_ip: &Ip4Addr, req: &[u8]) -> usize {
    fill_common(buf, OP_REPLY, host_mac, host_ip);
    let requester_mac: [u8; 6] = req[ARP_SHA].try_into().unwrap();
    let requester_ip: [u8; 4] = req[ARP_SPA].try_into().unwrap();
    buf[ARP_THA].copy_from_slice(&requester_mac);
    buf[ARP_TPA].copy_from_slice(&requester_ip);
    buf[ETH_DST].copy_from_slice(&requester_mac);
    buf[ETH_SRC].copy_from_slice(host_mac);
    buf[ETH_TYPE].copy_from_slice(&ETHERTYPE_ARP);
    ARP_FRAME_LEN
}

/// What an inbound ARP frame means, once validated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArpInbound {
    /// Someone is asking for `target_ip`; reply if it's ours.
    Request { sender_ip: Ip4Addr, sender_mac: MacAddr, target_ip: Ip4Addr },
    /// Someone announced `sender_ip` -> `sender_mac`.
    Reply { sender_ip: Ip4Addr, sender_mac: MacAddr },
    /// A reply claiming our own IP as sender: diagnostic only, no cache update.
    IpConflict { sender_mac: MacAddr },
    /// Frame too short or the fixed header bytes 14..19 don't match
    /// `CANONICAL_ARP_HEADER`: drop silently.
    MalformedHeader,
    /// Header matched but the opcode is neither request nor reply: drop
    /// silently.
    UnknownOpcode,
}

/// Classify a validated inbound ARP frame (`data.len() >= ARP_FRAME_LEN`
/// must already be checked by the caller, as with the Ethernet dispatch
/// path's length guard).
pub fn parse(data: &[u8], host_ip: &Ip4Addr) -> ArpInbound {
    if data.len() < ARP_FRAME_LEN || data[ARP_HEADER] != CANONICAL_ARP_HEADER {
        return ArpInbound::MalformedHeader;
    }
    let oper = u16::from_be_bytes([data[ARP_OPER.start], data[ARP_OPER.start + 1]]);
    let sender_mac: [u8; 6] = data[ARP_SHA].try_into().unwrap();
    let sender_ip: [u8; 4] = data[ARP_SPA].try_into().unwrap();
    match oper {
        OP_REQUEST => {
            let target_ip: [u8; 4] = data[ARP_TPA].try_into().unwrap();
            ArpInbound::Request { sender_ip, sender_mac, target_ip }
        }
        OP_REPLY => {
            if &sender_ip == host_ip {
                ArpInbound::IpConflict { sender_mac }
            } else {
                ArpInbound::Reply { sender_ip, sender_mac }
            }
        }
        _ => ArpInbound::UnknownOpcode,
    }
}

/// One non-blocking resolution attempt against the shared cache: either the
/// entry was already complete, or a request was just built (the frame is
/// copied out of the shared buffer so the lock need not be held while the
/// caller hands it to the MAC driver).
enum ArpAttempt {
    Resolved(MacAddr),
    RequestBuilt([u8; ARP_FRAME_LEN]),
}

/// Resolve `ip` to a MAC address from the cache without blocking: if
/// complete, return the MAC; otherwise issue a request (stamping a partial
/// entry) and return the frame to send. Acquires and releases `shared`'s
/// lock itself — this never sleeps, so it's safe to call with the lock
/// otherwise free.
fn arp_get_mac(shared: &Mutex<ArpShared>, now_ms: u32, host_mac: &MacAddr, host_ip: &Ip4Addr, ip: &Ip4Addr) -> ArpAttempt {
    let mut guard = shared.lock();
    let (slot, state) = guard.cache.lookup(ip, now_ms);
    if state == ArpState::Complete {
        return ArpAttempt::Resolved(guard.cache.entry(slot).mac);
    }
    guard.cache.mark_pending(ip, now_ms);
    let len = build_request(&mut guard.request_frame, host_mac, host_ip, ip);
    debug_assert_eq!(len, ARP_FRAME_LEN);
    ArpAttempt::RequestBuilt(guard.request_frame)
}

/// The 500 ms / 1500 ms retry backoff from `spec.md` §4.3.
const RETRY_DELAYS_MS: [u32; 2] = [500, 1500];

/// Resolve `ip` to a MAC address, retrying across two attempts with the
/// 500 ms / 1500 ms backoff windows. `shared`'s mutex is acquired only for
/// the brief lookup/request-issue step on each attempt (inside
/// `arp_get_mac`) and is never held across `sched.sleep_ms`, so the RX task
/// can ingest an ARP reply and populate the cache while we wait.
/// `send_arp_request` is a caller-supplied closure that pushes a just-built
/// ARP frame of `len` bytes to the MAC driver (kept out of this function so
/// it has no direct `MacDriver` dependency).
pub fn ip_enquire_arp<C, S>(
    shared: &Mutex<ArpShared>,
    clock: &C,
    sched: &S,
    host_mac: &MacAddr,
    host_ip: &Ip4Addr,
    ip: &Ip4Addr,
    mut send_arp_request: impl FnMut(&[u8], usize),
) -> Option<MacAddr>
where
    C: Clock,
    S: Scheduler,
{
    for &delay in RETRY_DELAYS_MS.iter() {
        let now = clock.ticks_ms();
        match arp_get_mac(shared, now, host_mac, host_ip, ip) {
            ArpAttempt::Resolved(mac) => return Some(mac),
            ArpAttempt::RequestBuilt(frame) => send_arp_request(&frame, ARP_FRAME_LEN),
        }
        sched.sleep_ms(delay);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST_MAC: MacAddr = [0x02, 0x4E, 0x49, 0x47, 0x45, 0x02];
    const HOST_IP: Ip4Addr = [192, 168, 1, 102];
    const PEER_MAC: MacAddr = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    const PEER_IP: Ip4Addr = [192, 168, 1, 101];

    #[test]
    fn request_has_broadcast_dst_and_zero_target_mac() {
        let mut buf = [0u8; ARP_FRAME_LEN];
        let len = build_request(&mut buf, &HOST_MAC, &HOST_IP, &PEER_IP);
        assert_eq!(len, ARP_FRAME_LEN);
        assert_eq!(&buf[ETH_DST], &BROADCAST_MAC);
        assert_eq!(&buf[ETH_SRC], &HOST_MAC);
        assert_eq!(&buf[ETH_TYPE], &ETHERTYPE_ARP);
        assert_eq!(u16::from_be_bytes([buf[20], buf[21]]), OP_REQUEST);
        assert_eq!(&buf[ARP_SHA], &HOST_MAC);
        assert_eq!(&buf[ARP_SPA], &HOST_IP);
        assert_eq!(&buf[ARP_THA], &[0u8; 6]);
        assert_eq!(&buf[ARP_TPA], &PEER_IP);
    }

    #[test]
    fn gratuitous_targets_own_ip() {
        let mut buf = [0u8; ARP_FRAME_LEN];
        build_gratuitous(&mut buf, &HOST_MAC, &HOST_IP);
        assert_eq!(&buf[ARP_TPA], &HOST_IP);
        assert_eq!(&buf[ARP_SPA], &HOST_IP);
    }

    #[test]
    fn reply_echoes_requester_fields_and_targets_the_requester() {
        let mut req = [0u8; ARP_FRAME_LEN];
        build_request(&mut req, &PEER_MAC, &PEER_IP, &HOST_IP);
        let mut reply = [0u8; ARP_FRAME_LEN];
        build_reply(&mut reply, &HOST_MAC, &HOST_IP, &req);
        assert_eq!(u16::from_be_bytes([reply[20], reply[21]]), OP_REPLY);
        assert_eq!(&reply[ARP_SHA], &HOST_MAC);
        assert_eq!(&reply[ARP_SPA], &HOST_IP);
        assert_eq!(&reply[ARP_THA], &PEER_MAC);
        assert_eq!(&reply[ARP_TPA], &PEER_IP);
        assert_eq!(&reply[ETH_DST], &PEER_MAC);
    }

    #[test]
    fn who_has_round_trip_produces_reply_targeting_original_sender() {
        let mut req = [0u8; ARP_FRAME_LEN];
        build_request(&mut req, &PEER_MAC, &PEER_IP, &HOST_IP);
        match parse(&req, &HOST_IP) {
            ArpInbound::Request { sender_ip, sender_mac, target_ip } => {
                assert_eq!(sender_ip, PEER_IP);
                assert_eq!(sender_mac, PEER_MAC);
                assert_eq!(target_ip, HOST_IP);
            }
            other => panic!("expected Request, got {:?}", other),
        }
    }

    #[test]
    fn reply_with_our_own_ip_as_sender_is_a_conflict() {
        let mut buf = [0u8; ARP_FRAME_LEN];
        build_request(&mut buf, &PEER_MAC, &HOST_IP, &PEER_IP);
        buf[20..22].copy_from_slice(&OP_REPLY.to_be_bytes());
        match parse(&buf, &HOST_IP) {
            ArpInbound::IpConflict { sender_mac } => assert_eq!(sender_mac, PEER_MAC),
            other => panic!("expected IpConflict, got {:?}", other),
        }
    }

    #[test]
    fn unknown_opcode_and_bad_header_drop() {
        let mut buf = [0u8; ARP_FRAME_LEN];
        build_request(&mut buf, &PEER_MAC, &PEER_IP, &HOST_IP);
        buf[20..22].copy_from_slice(&9u16.to_be_bytes());
        assert_eq!(parse(&buf, &HOST_IP), ArpInbound::UnknownOpcode);

        let mut bad_header = [0u8; ARP_FRAME_LEN];
        build_request(&mut bad_header, &PEER_MAC, &PEER_IP, &HOST_IP);
        bad_header[14] = 0xFF;
        assert_eq!(parse(&bad_header, &HOST_IP), ArpInbound::MalformedHeader);
    }

    #[test]
    fn arp_get_mac_issues_request_on_miss_then_resolves_after_cache_update() {
        let shared = Mutex::new(ArpShared::new());
        shared.lock().init(0);
        match arp_get_mac(&shared, 0, &HOST_MAC, &HOST_IP, &PEER_IP) {
            ArpAttempt::RequestBuilt(frame) => assert_eq!(&frame[ARP_TPA], &PEER_IP),
            ArpAttempt::Resolved(_) => panic!("expected a request to be built on a miss"),
        }

        shared.lock().cache.update_from_frame(&PEER_IP, &PEER_MAC, 10);
        match arp_get_mac(&shared, 20, &HOST_MAC, &HOST_IP, &PEER_IP) {
            ArpAttempt::Resolved(mac) => assert_eq!(mac, PEER_MAC),
            ArpAttempt::RequestBuilt(_) => panic!("expected the cache hit to resolve without a new request"),
        }
    }

    #[test]
    fn ip_enquire_arp_never_returns_some_while_the_entry_is_still_partial() {
        let shared = Mutex::new(ArpShared::new());
        shared.lock().init(0);
        struct FakeClock(core::cell::Cell<u32>);
        impl Clock for FakeClock {
            fn ticks_ms(&self) -> u32 {
                self.0.get()
            }
        }
        struct NoopScheduler;
        impl Scheduler for NoopScheduler {
            fn sleep_ms(&self, _ms: u32) {}
        }
        let clock = FakeClock(core::cell::Cell::new(0));
        let sched = NoopScheduler;
        let mut sent = 0usize;
        let mac = ip_enquire_arp(&shared, &clock, &sched, &HOST_MAC, &HOST_IP, &PEER_IP, |_buf, _len| sent += 1);
        assert_eq!(mac, None);
        assert_eq!(sent, 2);
        let (_, state) = shared.lock().cache.lookup(&PEER_IP, 0);
        assert_eq!(state, ArpState::Partial);
    }
}
