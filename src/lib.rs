#![no_std]
#![forbid(unsafe_code)]
//! A minimalist UDP/IPv4 stack over Ethernet II for an embedded host with a
//! single network interface and no dynamic memory.
//!
//! Covers the protocol machinery only: ARP resolution and cache management,
//! IP forwarding and checksum validation, UDP send/receive with the
//! pseudo-header checksum, and the two-task concurrency model that drives
//! ingress and egress independently. A `task::NetStack` holds only the
//! state the two tasks must share (the ARP cache and its mutex); the RX
//! task and the send path each get their own handle (`task::RxHandle`,
//! `task::TxHandle`) owning their own frame buffer, so one can block in
//! `sleep_ms` without stopping the other from running. The MAC driver,
//! system tick source, task/mutex primitives, and application-level payload
//! sink are external collaborators, expressed as the
//! `task::{MacDriver, Clock, Scheduler}` traits a host integration
//! implements.
//!
//! Priority features ([x]=works, [ ]=not in scope here):
//! - [x] Ethernet frame RX and protocol handler dispatch
//! - [x] Packet filter: drop bad checksum, wrong destination, fragment, etc.
//! - [x] Diagnostic stats event counters (`debug::FilterStats`)
//! - [x] Ethernet frame TX
//! - [x] ARP cache with LRU replacement and 20-minute staleness
//! - [x] ARP request/reply/gratuitous, two-attempt retry backoff
//! - [x] UDP send/receive with the pseudo-header checksum
//! - [ ] DHCP, ICMP, IPv6, fragmentation, TCP — out of scope

pub mod arp;
pub mod debug;
pub mod endian;
pub mod error;
pub mod eth;
pub mod host;
pub mod ip;
pub mod task;
pub mod udp;

pub use error::NetError;
pub use host::HostConfig;
pub use task::{Clock, MacDriver, NetStack, RxHandle, Scheduler, TxHandle};
