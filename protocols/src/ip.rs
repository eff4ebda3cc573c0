use std::net::{Ipv4Addr, Ipv6Addr};

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{self, Ipv4Flags, MutableIpv4Packet};
use pnet::packet::ipv6::MutableIpv6Packet;

use crate::codec::CodecError;
use crate::{IPV4_HDR_LEN, IPV6_HDR_LEN};

pub const DEFAULT_TTL: u8 = 64;

/// Writes a 20-byte IPv4 header. `total_length` covers header and payload.
///
/// When `checksum` is false the header checksum stays zero, which is what a
/// raw socket with `IP_HDRINCL` expects: the kernel fills it in.
#[allow(clippy::too_many_arguments)]
pub fn create_ipv4_header(
    buf: &mut [u8],
    total_length: u16,
    identification: u16,
    ttl: u8,
    nxt_ptc: IpNextHeaderProtocol,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    checksum: bool,
) -> Result<(), CodecError> {
    let header: &mut [u8] = buf.get_mut(..IPV4_HDR_LEN).ok_or(CodecError::Buffer("ipv4"))?;
    let mut ipv4 = MutableIpv4Packet::new(header).ok_or(CodecError::Buffer("ipv4"))?;
    ipv4.set_version(4);
    ipv4.set_header_length(5);
    ipv4.set_dscp(0);
    ipv4.set_ecn(0);
    ipv4.set_total_length(total_length);
    ipv4.set_identification(identification);
    ipv4.set_flags(Ipv4Flags::DontFragment);
    ipv4.set_fragment_offset(0);
    ipv4.set_ttl(ttl);
    ipv4.set_next_level_protocol(nxt_ptc);
    ipv4.set_source(src_addr);
    ipv4.set_destination(dst_addr);

    ipv4.set_checksum(0);
    if checksum {
        let csm: u16 = ipv4::checksum(&ipv4.to_immutable());
        ipv4.set_checksum(csm);
    }
    Ok(())
}

/// Writes a 40-byte IPv6 header. IPv6 has no header checksum.
pub fn create_ipv6_header(
    buf: &mut [u8],
    payload_length: u16,
    hop_limit: u8,
    nxt_ptc: IpNextHeaderProtocol,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
) -> Result<(), CodecError> {
    let header: &mut [u8] = buf.get_mut(..IPV6_HDR_LEN).ok_or(CodecError::Buffer("ipv6"))?;
    let mut pkt = MutableIpv6Packet::new(header).ok_or(CodecError::Buffer("ipv6"))?;
    pkt.set_version(6);
    pkt.set_traffic_class(0);
    pkt.set_flow_label(0);
    pkt.set_payload_length(payload_length);
    pkt.set_next_header(nxt_ptc);
    pkt.set_hop_limit(hop_limit);
    pkt.set_source(src_addr);
    pkt.set_destination(dst_addr);
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
