pub mod cache;
pub mod proto;

pub use cache::{ArpCache, ArpEntry, ArpState};
pub use proto::{
    build_gratuitous, build_reply, build_request, ip_enquire_arp, parse as arp_parse, ArpInbound, ArpShared,
    ARP_FRAME_LEN,
};
