//! UDP layer: header construction with the pseudo-header checksum, and
//! inbound verification + extraction.
//!
//! Frame layout: UDP header at bytes 34..42 (src port, dst port, length,
//! checksum), payload starting at byte 42.

use crate::endian::{checksum_add, checksum_add_and_move, checksum_fold, read_u16_be, write_u16_be};
use crate::host::Ip4Addr;
use crate::ip::PROTO_UDP;

pub const UDP_HEADER_OFFSET: usize = 34;
pub const UDP_HEADER_LEN: usize = 8;
pub const UDP_PAYLOAD_OFFSET: usize = 42;
/// 1518-byte Ethernet frame minus the 14-byte MAC header, 20-byte IP
/// header, and 8-byte UDP header.
pub const MAX_UDP_PAYLOAD: usize = 1518 - UDP_PAYLOAD_OFFSET;

/// `{src_ip(4), dst_ip(4), zero(1), proto(1), udp_len(2)}`.
fn pseudo_header(src_ip: &Ip4Addr, dst_ip: &Ip4Addr, udp_len: u16) -> [u8; 12] {
    let mut h = [0u8; 12];
    h[0..4].copy_from_slice(src_ip);
    h[4..8].copy_from_slice(dst_ip);
    h[8] = 0;
    h[9] = PROTO_UDP;
    write_u16_be(&mut h[10..12], udp_len);
    h
}

/// Build the UDP header + checksummed, copied-in payload into
/// `frame[34..42+n]`. Returns the UDP length (8 + n) to hand to the IP
/// layer. The checksum field is written in network byte order
/// (`spec.md` §9 open question #1 resolved).
pub fn build_and_checksum(
    frame: &mut [u8],
    host_ip: &Ip4Addr,
    dest_ip: &Ip4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> u16 {
    let n = payload.len();
    let udp_len = (UDP_HEADER_LEN + n) as u16;
    {
        let h = &mut frame[UDP_HEADER_OFFSET..UDP_HEADER_OFFSET + UDP_HEADER_LEN];
        write_u16_be(&mut h[0..2], src_port);
        write_u16_be(&mut h[2..4], dst_port);
        write_u16_be(&mut h[4..6], udp_len);
        write_u16_be(&mut h[6..8], 0);
    }
    let pseudo = pseudo_header(host_ip, dest_ip, udp_len);
    let mut sum = checksum_add(0, &pseudo, pseudo.len());
    sum = checksum_add(sum, &frame[UDP_HEADER_OFFSET..UDP_HEADER_OFFSET + UDP_HEADER_LEN], UDP_HEADER_LEN);
    let payload_dst_start = UDP_PAYLOAD_OFFSET;
    sum = checksum_add_and_move(sum, payload, &mut frame[payload_dst_start..payload_dst_start + n], n);
    let csum = checksum_fold(sum);
    write_u16_be(&mut frame[UDP_HEADER_OFFSET + 6..UDP_HEADER_OFFSET + 8], csum);
    udp_len
}

/// Why `verify_and_extract` rejected a datagram.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UdpCheckError {
    ChecksumInvalid,
    WrongPort,
}

/// Verify an inbound UDP datagram's checksum (pseudo-header + as-received
/// header, checksum field included) and, if it matches and the destination
/// port equals `local_port`, return the payload slice. Both failure modes
/// are silent drops per `spec.md` §7; the distinction only matters for
/// which `FilterBin` counts the event.
pub fn verify_and_extract<'a>(
    frame: &'a [u8],
    src_ip: &Ip4Addr,
    dst_ip: &Ip4Addr,
    local_port: u16,
) -> Result<&'a [u8], UdpCheckError> {
    if frame.len() < UDP_HEADER_OFFSET + UDP_HEADER_LEN {
        return Err(UdpCheckError::ChecksumInvalid);
    }
    let udp_len = read_u16_be(&frame[UDP_HEADER_OFFSET + 4..UDP_HEADER_OFFSET + 6]);
    if (udp_len as usize) < UDP_HEADER_LEN {
        return Err(UdpCheckError::ChecksumInvalid);
    }
    if frame.len() < UDP_HEADER_OFFSET + udp_len as usize {
        return Err(UdpCheckError::ChecksumInvalid);
    }
    let pseudo = pseudo_header(src_ip, dst_ip, udp_len);
    let mut sum = checksum_add(0, &pseudo, pseudo.len());
    sum = checksum_add(sum, &frame[UDP_HEADER_OFFSET..UDP_HEADER_OFFSET + udp_len as usize], udp_len as usize);
    if checksum_fold(sum) != 0 {
        return Err(UdpCheckError::ChecksumInvalid);
    }
    let dst_port = read_u16_be(&frame[UDP_HEADER_OFFSET + 2..UDP_HEADER_OFFSET + 4]);
    if dst_port != local_port {
        return Err(UdpCheckError::WrongPort);
    }
    let n = udp_len as usize - UDP_HEADER_LEN;
    Ok(&frame[UDP_PAYLOAD_OFFSET..UDP_PAYLOAD_OFFSET + n])
}
