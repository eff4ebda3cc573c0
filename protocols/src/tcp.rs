use std::net::IpAddr;

use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags};

use crate::TCP_HDR_LEN;
use crate::codec::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: u8,
    pub window: u16,
}

/// Writes a TCP segment (20-byte header, no options) followed by `payload`.
///
/// `pseudo` carries the addresses for the pseudo-header checksum; `None`
/// leaves the checksum zero.
pub fn write_segment(
    buf: &mut [u8],
    layer: &TcpLayer,
    payload: &[u8],
    pseudo: Option<(IpAddr, IpAddr)>,
) -> Result<(), CodecError> {
    let segment: &mut [u8] = buf
        .get_mut(..TCP_HDR_LEN + payload.len())
        .ok_or(CodecError::Buffer("tcp"))?;
    let mut pkt = MutableTcpPacket::new(segment).ok_or(CodecError::Buffer("tcp"))?;
    pkt.set_source(layer.source_port);
    pkt.set_destination(layer.destination_port);
    pkt.set_sequence(layer.sequence);
    pkt.set_acknowledgement(layer.acknowledgement);
    pkt.set_data_offset(5);
    pkt.set_reserved(0);
    pkt.set_flags(layer.flags);
    pkt.set_window(layer.window);
    pkt.set_urgent_ptr(0);
    pkt.set_payload(payload);
    pkt.set_checksum(0);

    let csm: u16 = match pseudo {
        Some((IpAddr::V4(src), IpAddr::V4(dst))) => tcp::ipv4_checksum(&pkt.to_immutable(), &src, &dst),
        Some((IpAddr::V6(src), IpAddr::V6(dst))) => tcp::ipv6_checksum(&pkt.to_immutable(), &src, &dst),
        Some((src, destination)) => return Err(CodecError::FamilyMismatch { src, destination }),
        None => 0,
    };
    pkt.set_checksum(csm);
    Ok(())
}

/// Compact flag text used in observation lines, e.g. `SYN|ACK`.
pub fn flags_label(flags: u8) -> String {
    const NAMES: [(u8, &str); 6] = [
        (TcpFlags::SYN, "SYN"),
        (TcpFlags::FIN, "FIN"),
        (TcpFlags::RST, "RST"),
        (TcpFlags::PSH, "PSH"),
        (TcpFlags::ACK, "ACK"),
        (TcpFlags::URG, "URG"),
    ];

    let set: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();

    if set.is_empty() { "NONE".to_string() } else { set.join("|") }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
