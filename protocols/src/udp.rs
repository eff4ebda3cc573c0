use std::net::IpAddr;

use pnet::packet::udp::{self, MutableUdpPacket};

use crate::UDP_HDR_LEN;
use crate::codec::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpLayer {
    pub source_port: u16,
    pub destination_port: u16,
}

/// Writes a UDP datagram. The length field must already have been checked to
/// fit in 16 bits.
pub fn write_datagram(
    buf: &mut [u8],
    layer: &UdpLayer,
    payload: &[u8],
    pseudo: Option<(IpAddr, IpAddr)>,
) -> Result<(), CodecError> {
    let total_len: usize = UDP_HDR_LEN + payload.len();
    let length: u16 = u16::try_from(total_len).map_err(|_| CodecError::PayloadTooLarge {
        layer: "udp",
        length: total_len,
    })?;
    let datagram: &mut [u8] = buf.get_mut(..total_len).ok_or(CodecError::Buffer("udp"))?;
    let mut udp = MutableUdpPacket::new(datagram).ok_or(CodecError::Buffer("udp"))?;
    udp.set_source(layer.source_port);
    udp.set_destination(layer.destination_port);
    udp.set_length(length);
    udp.set_payload(payload);
    udp.set_checksum(0);

    let csm: u16 = match pseudo {
        Some((IpAddr::V4(src), IpAddr::V4(dst))) => udp::ipv4_checksum(&udp.to_immutable(), &src, &dst),
        Some((IpAddr::V6(src), IpAddr::V6(dst))) => udp::ipv6_checksum(&udp.to_immutable(), &src, &dst),
        Some((src, destination)) => return Err(CodecError::FamilyMismatch { src, destination }),
        None => return Ok(()),
    };
    // a computed zero is transmitted as all ones
    udp.set_checksum(if csm == 0 { 0xffff } else { csm });
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
