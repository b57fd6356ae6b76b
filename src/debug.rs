//! Debug printers and packet-filter diagnostics, routed through the `log`
//! facade (see `SPEC_FULL.md` §2 for why this crate doesn't carry its own
//! UART-specific logger the way the teacher firmware does).

use core::fmt;

use crate::host::{Ip4Addr, MacAddr};

/// `.MAC`-style formatter: `02:4E:49:47:45:02`.
pub struct MacFmt(pub MacAddr);
impl fmt::Display for MacFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

/// `.IP`-style formatter: `192.168.1.102`.
pub struct Ip4Fmt(pub Ip4Addr);
impl fmt::Display for Ip4Fmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{}.{}.{}.{}", b[0], b[1], b[2], b[3])
    }
}

/// Every bin a frame (or a send-path event) can be sorted into, matching
/// the error-kind table in `spec.md` §7 one row per variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterBin {
    DropEtherType,
    DropDestMac,
    DropArpMalformed,
    DropArpUnknownOp,
    /// ARP request whose target IP isn't ours: no row in the error table,
    /// but `arp_in` takes no action for it either, so it gets its own bin
    /// rather than being folded into a drop reason it isn't.
    DropArpNotForUs,
    DropIpChecksum,
    DropIpNotForUs,
    DropIpUnknownProto,
    DropUdpChecksum,
    DropUdpPort,
    ArpTimeout,
    IpConflict,
    ArpReplySent,
    /// Inbound ARP reply accepted and the cache updated.
    ArpResolved,
    Delivered,
}

/// Saturating per-bin counters, dumped via `log_state`.
#[derive(Copy, Clone, Debug, Default)]
pub struct FilterStats {
    pub drop_etype: u32,
    pub drop_dest_mac: u32,
    pub drop_arp_malformed: u32,
    pub drop_arp_unknown_op: u32,
    pub drop_arp_not_for_us: u32,
    pub drop_ip_checksum: u32,
    pub drop_ip_not_for_us: u32,
    pub drop_ip_unknown_proto: u32,
    pub drop_udp_checksum: u32,
    pub drop_udp_port: u32,
    pub arp_timeout: u32,
    pub ip_conflict: u32,
    pub arp_reply_sent: u32,
    pub arp_resolved: u32,
    pub delivered: u32,
}

impl FilterStats {
    pub const fn new() -> Self {
        Self {
            drop_etype: 0,
            drop_dest_mac: 0,
            drop_arp_malformed: 0,
            drop_arp_unknown_op: 0,
            drop_arp_not_for_us: 0,
            drop_ip_checksum: 0,
            drop_ip_not_for_us: 0,
            drop_ip_unknown_proto: 0,
            drop_udp_checksum: 0,
            drop_udp_port: 0,
            arp_timeout: 0,
            ip_conflict: 0,
            arp_reply_sent: 0,
            arp_resolved: 0,
            delivered: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn inc(&mut self, bin: FilterBin) {
        let counter = match bin {
            FilterBin::DropEtherType => &mut self.drop_etype,
            FilterBin::DropDestMac => &mut self.drop_dest_mac,
            FilterBin::DropArpMalformed => &mut self.drop_arp_malformed,
            FilterBin::DropArpUnknownOp => &mut self.drop_arp_unknown_op,
            FilterBin::DropArpNotForUs => &mut self.drop_arp_not_for_us,
            FilterBin::DropIpChecksum => &mut self.drop_ip_checksum,
            FilterBin::DropIpNotForUs => &mut self.drop_ip_not_for_us,
            FilterBin::DropIpUnknownProto => &mut self.drop_ip_unknown_proto,
            FilterBin::DropUdpChecksum => &mut self.drop_udp_checksum,
            FilterBin::DropUdpPort => &mut self.drop_udp_port,
            FilterBin::ArpTimeout => &mut self.arp_timeout,
            FilterBin::IpConflict => &mut self.ip_conflict,
            FilterBin::ArpReplySent => &mut self.arp_reply_sent,
            FilterBin::ArpResolved => &mut self.arp_resolved,
            FilterBin::Delivered => &mut self.delivered,
        };
        *counter = counter.saturating_add(1);
    }

    /// Dump every counter to the log at debug level.
    pub fn log_state(&self) {
        log::debug!("DropEType {}", self.drop_etype);
        log::debug!("DropDestMac {}", self.drop_dest_mac);
        log::debug!("DropArpMalformed {}", self.drop_arp_malformed);
        log::debug!("DropArpUnknownOp {}", self.drop_arp_unknown_op);
        log::debug!("DropArpNotForUs {}", self.drop_arp_not_for_us);
        log::debug!("DropIpChecksum {}", self.drop_ip_checksum);
        log::debug!("DropIpNotForUs {}", self.drop_ip_not_for_us);
        log::debug!("DropIpUnknownProto {}", self.drop_ip_unknown_proto);
        log::debug!("DropUdpChecksum {}", self.drop_udp_checksum);
        log::debug!("DropUdpPort {}", self.drop_udp_port);
        log::debug!("ArpTimeout {}", self.arp_timeout);
        log::debug!("IpConflict {}", self.ip_conflict);
        log::debug!("ArpReplySent {}", self.arp_reply_sent);
        log::debug!("ArpResolved {}", self.arp_resolved);
        log::debug!("Delivered {}", self.delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedWriter {
        buf: [u8; 32],
        len: usize,
    }
    impl FixedWriter {
        fn new() -> Self {
            Self { buf: [0; 32], len: 0 }
        }
        fn as_str(&self) -> &str {
            core::str::from_utf8(&self.buf[..self.len]).unwrap()
        }
    }
    impl fmt::Write for FixedWriter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let bytes = s.as_bytes();
            self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }

    #[test]
    fn mac_and_ip_format_as_expected() {
        use core::fmt::Write;
        let mut w = FixedWriter::new();
        write!(w, "{}", MacFmt([0x02, 0x4E, 0x49, 0x47, 0x45, 0x02])).unwrap();
        assert_eq!(w.as_str(), "02:4E:49:47:45:02");

        let mut w2 = FixedWriter::new();
        write!(w2, "{}", Ip4Fmt([192, 168, 1, 102])).unwrap();
        assert_eq!(w2.as_str(), "192.168.1.102");
    }

    #[test]
    fn counters_saturate_and_reset() {
        let mut s = FilterStats::new();
        s.inc(FilterBin::Delivered);
        s.inc(FilterBin::Delivered);
        assert_eq!(s.delivered, 2);
        s.reset();
        assert_eq!(s.delivered, 0);
    }
}
