//! Top-level orchestration: the two-task concurrency model from `spec.md`
//! §2/§4.8/§5 realized as one shared `NetStack` plus two independent,
//! non-overlapping handles — `RxHandle` for the receive task, `TxHandle` for
//! the send path — so the two tasks can genuinely run concurrently instead
//! of both requiring exclusive access to one monolithic struct.
//!
//! Only the pieces `spec.md` §5 actually requires mutual exclusion over —
//! the ARP cache and the one shared outbound ARP staging buffer
//! (`arp::ArpShared`) — sit behind `arp_shared`'s mutex. `in_frame` is
//! owned outright by `RxHandle` (RX-task-local, per §5), `udp_frame` by
//! whichever `TxHandle` is in use (the sender handle per §9's "expose
//! udp_send as a method on a &mut sender handle"), and host configuration
//! is read-only `Copy` data shared by value. This mirrors the teacher's
//! `sw/net/src/lib.rs` split between `NetState` (protocol state) and
//! `handle_frame` (the per-frame dispatch body), generalized so the state
//! that must be shared and the state that must not both have a type that
//! says so.

use spin::Mutex;

use crate::arp::{self, ArpInbound, ArpShared, ARP_FRAME_LEN};
use crate::debug::{self, FilterBin, FilterStats};
use crate::error::NetError;
use crate::eth;
use crate::host::{HostConfig, Ip4Addr};
use crate::ip::{self, IpCheckError};
use crate::udp::{self, UdpCheckError};

/// Monotonic millisecond tick source. Wrap is expected and handled with
/// unsigned subtraction throughout the ARP cache.
pub trait Clock {
    fn ticks_ms(&self) -> u32;
}

/// Cooperative delay used only by the ARP retry backoff. Must never be
/// called while holding the ARP cache mutex — see `spec.md` §5.
pub trait Scheduler {
    fn sleep_ms(&self, ms: u32);
}

/// The Ethernet MAC this stack drives. Both methods are expected to block:
/// `get_frame` until a frame is available, `put_frame` until it is queued.
/// An embedder wiring up both `RxHandle` and `TxHandle` against the same
/// physical MAC implements this for a shared handle type (e.g. `&Driver`
/// with interior mutability over the hardware queues), the same way the
/// test `FakeMac` below does — `get_frame` is only ever called by the RX
/// task, but `put_frame` is called from both tasks.
pub trait MacDriver {
    /// Copy the next inbound frame into `buf`, returning its length.
    fn get_frame(&mut self, buf: &mut [u8]) -> usize;
    /// Hand `len` bytes of `buf` to the MAC for transmission.
    fn put_frame(&mut self, buf: &[u8], len: usize);
}

const FRAME_BUF_LEN: usize = 1518;

/// The state genuinely shared between the RX task and the send path: host
/// configuration (read-only after init), the mutex-guarded ARP cache +
/// outbound ARP buffer, and packet-filter diagnostics. There is exactly one
/// `NetStack` per interface and no teardown path, matching `spec.md` §3's
/// lifecycle note. `RxHandle`/`TxHandle` borrow it for as long as their
/// owning task runs.
pub struct NetStack {
    host: HostConfig,
    arp_shared: Mutex<ArpShared>,
    stats: Mutex<FilterStats>,
}

impl NetStack {
    pub fn new(host: HostConfig, now_ms: u32) -> Self {
        let mut arp_shared = ArpShared::new();
        arp_shared.init(now_ms);
        Self {
            host,
            arp_shared: Mutex::new(arp_shared),
            stats: Mutex::new(FilterStats::new()),
        }
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    /// A snapshot of the packet-filter diagnostic counters.
    pub fn stats(&self) -> FilterStats {
        *self.stats.lock()
    }

    /// Send a gratuitous ARP announcing our own IP. Typically called once at
    /// startup, after `host` has been configured, from whichever task is
    /// convenient — it only needs the shared ARP buffer briefly, not a
    /// dedicated handle.
    pub fn announce<M: MacDriver>(&self, mac_driver: &mut M) {
        let mut guard = self.arp_shared.lock();
        let len = arp::build_gratuitous(&mut guard.request_frame, &self.host.mac, &self.host.ip);
        let mut frame = [0u8; ARP_FRAME_LEN];
        frame[..len].copy_from_slice(&guard.request_frame[..len]);
        drop(guard);
        mac_driver.put_frame(&frame, len);
    }

    /// Bind the receive task to this stack. Owns its own `in_frame` staging
    /// buffer and `mac_driver`/`clock`; call `poll_rx` on the result in a
    /// loop for the RX task's super-loop (`spec.md` §4.8).
    pub fn rx_handle<M: MacDriver, C: Clock>(&self, mac_driver: M, clock: C) -> RxHandle<'_, M, C> {
        RxHandle {
            stack: self,
            mac_driver,
            clock,
            in_frame: [0u8; FRAME_BUF_LEN],
        }
    }

    /// Bind a send path to this stack. Owns its own `udp_frame` staging
    /// buffer; `spec.md` §5 assumes at most one outstanding `udp_send` — a
    /// single `TxHandle` per concurrent sender enforces that by construction
    /// (`udp_send` takes `&mut self` on the handle, not on `NetStack`).
    pub fn tx_handle<M: MacDriver, C: Clock, S: Scheduler>(&self, mac_driver: M, clock: C, sched: S) -> TxHandle<'_, M, C, S> {
        TxHandle {
            stack: self,
            mac_driver,
            clock,
            sched,
            udp_frame: [0u8; FRAME_BUF_LEN],
        }
    }
}

/// The receive task: the only consumer of the MAC's ingress queue. Each call
/// to `poll_rx` reads one complete frame and dispatches it to completion
/// before returning, per `spec.md` §4.8 — no preemption is assumed inside a
/// handler.
pub struct RxHandle<'a, M: MacDriver, C: Clock> {
    stack: &'a NetStack,
    mac_driver: M,
    clock: C,
    in_frame: [u8; FRAME_BUF_LEN],
}

impl<'a, M: MacDriver, C: Clock> RxHandle<'a, M, C> {
    /// Fetch one frame from the MAC driver and dispatch it. `None` means the
    /// MAC driver had nothing pending (a non-blocking driver); a blocking
    /// `get_frame` never returns 0 and this always dispatches.
    pub fn poll_rx(&mut self) -> Option<FilterBin> {
        let len = self.mac_driver.get_frame(&mut self.in_frame);
        if len == 0 {
            return None;
        }
        let now = self.clock.ticks_ms();
        let bin = handle_frame(&self.in_frame[..len], &self.stack.host, &self.stack.arp_shared, &mut self.mac_driver, now);
        self.stack.stats.lock().inc(bin);
        Some(bin)
    }
}

fn handle_frame<M: MacDriver>(frame: &[u8], host: &HostConfig, arp_shared: &Mutex<ArpShared>, mac_driver: &mut M, now: u32) -> FilterBin {
    match eth::eth_check(frame, &host.mac) {
        Some(eth::ETHERTYPE_ARP) => handle_arp_frame(frame, host, arp_shared, mac_driver, now),
        Some(eth::ETHERTYPE_IPV4) => handle_ip_frame(frame, host),
        Some(_) => FilterBin::DropEtherType,
        None => FilterBin::DropDestMac,
    }
}

fn handle_arp_frame<M: MacDriver>(frame: &[u8], host: &HostConfig, arp_shared: &Mutex<ArpShared>, mac_driver: &mut M, now: u32) -> FilterBin {
    match arp::arp_parse(frame, &host.ip) {
        ArpInbound::MalformedHeader => FilterBin::DropArpMalformed,
        ArpInbound::UnknownOpcode => FilterBin::DropArpUnknownOp,
        ArpInbound::IpConflict { sender_mac } => {
            log::warn!(
                "ARP conflict: {} claims our IP {}",
                debug::MacFmt(sender_mac),
                debug::Ip4Fmt(host.ip)
            );
            FilterBin::IpConflict
        }
        ArpInbound::Reply { sender_ip, sender_mac } => {
            arp_shared.lock().cache.update_from_frame(&sender_ip, &sender_mac, now);
            FilterBin::ArpResolved
        }
        ArpInbound::Request { sender_ip, sender_mac, target_ip } => {
            if target_ip != host.ip {
                return FilterBin::DropArpNotForUs;
            }
            let mut guard = arp_shared.lock();
            guard.cache.update_from_frame(&sender_ip, &sender_mac, now);
            let len = arp::build_reply(&mut guard.request_frame, &host.mac, &host.ip, frame);
            let mut out = [0u8; ARP_FRAME_LEN];
            out[..len].copy_from_slice(&guard.request_frame[..len]);
            drop(guard);
            mac_driver.put_frame(&out, len);
            FilterBin::ArpReplySent
        }
    }
}

fn handle_ip_frame(frame: &[u8], host: &HostConfig) -> FilterBin {
    match ip::ip_check(frame, &host.ip) {
        Err(IpCheckError::ChecksumInvalid) => FilterBin::DropIpChecksum,
        Err(IpCheckError::NotForUs) => FilterBin::DropIpNotForUs,
        Ok(ip::PROTO_UDP) => handle_udp_frame(frame, host),
        Ok(_) => FilterBin::DropIpUnknownProto,
    }
}

fn handle_udp_frame(frame: &[u8], host: &HostConfig) -> FilterBin {
    let src_ip: Ip4Addr = frame[26..30].try_into().unwrap();
    match udp::verify_and_extract(frame, &src_ip, &host.ip, host.udp_src_port) {
        Err(UdpCheckError::ChecksumInvalid) => FilterBin::DropUdpChecksum,
        Err(UdpCheckError::WrongPort) => FilterBin::DropUdpPort,
        Ok(payload) => {
            deliver(payload);
            FilterBin::Delivered
        }
    }
}

/// Application delivery hook. The base crate only logs; a host integration
/// wanting real delivery should build its own wrapper around these
/// primitives instead (`spec.md` §6's application API is a callback
/// contract, not a concrete sink).
fn deliver(payload: &[u8]) {
    log::debug!("udp_in: {} byte payload", payload.len());
}

/// The send path: composes an outgoing UDP/IP/Ethernet frame, resolves the
/// next-hop MAC (possibly sleeping across ARP retries), and pushes the
/// finished frame. Owns its own `udp_frame`, so `udp_send` only needs `&mut
/// self` on this handle — the RX task's `RxHandle` is untouched by it and
/// can keep polling (and populating the ARP cache) while this sleeps.
pub struct TxHandle<'a, M: MacDriver, C: Clock, S: Scheduler> {
    stack: &'a NetStack,
    mac_driver: M,
    clock: C,
    sched: S,
    udp_frame: [u8; FRAME_BUF_LEN],
}

impl<'a, M: MacDriver, C: Clock, S: Scheduler> TxHandle<'a, M, C, S> {
    /// Send a UDP datagram to the configured destination IP/port from the
    /// configured source port (`spec.md` §4.7/§6). Builds the UDP and IP
    /// headers in the handle's own `udp_frame`, resolves the next-hop MAC
    /// (direct if on-subnet, else via the router), and pushes the finished
    /// Ethernet frame. Returns `Ok(())` once queued with the MAC driver;
    /// ARP resolution failure is a silent drop per `spec.md` §7, not an
    /// error, matching UDP's unreliable-delivery contract.
    pub fn udp_send(&mut self, payload: &[u8]) -> Result<(), NetError> {
        let host = self.stack.host;
        if !host.is_configured() {
            return Err(NetError::HostNotConfigured);
        }
        let max = udp::MAX_UDP_PAYLOAD;
        if payload.len() > max {
            return Err(NetError::PayloadTooLarge { len: payload.len(), max });
        }

        let udp_len = udp::build_and_checksum(
            &mut self.udp_frame,
            &host.ip,
            &host.udp_dest_ip,
            host.udp_src_port,
            host.udp_dst_port,
            payload,
        );
        let ident = self.clock.ticks_ms() as u16;
        ip::dispatch_udp_header(&mut self.udp_frame, &host.ip, &host.udp_dest_ip, udp_len, ident);

        let next_hop = if host.same_subnet(&host.udp_dest_ip) {
            host.udp_dest_ip
        } else {
            host.router_ip
        };

        let mac_driver = &mut self.mac_driver;
        let mac = arp::ip_enquire_arp(&self.stack.arp_shared, &self.clock, &self.sched, &host.mac, &host.ip, &next_hop, |buf, len| {
            mac_driver.put_frame(buf, len);
        });

        match mac {
            Some(mac) => {
                let len = eth::dispatch_ip_header(&mut self.udp_frame, &mac, &host.mac);
                self.mac_driver.put_frame(&self.udp_frame, len);
                Ok(())
            }
            None => {
                self.stack.stats.lock().inc(FilterBin::ArpTimeout);
                Ok(())
            }
        }
    }
}
