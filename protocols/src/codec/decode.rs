use std::net::IpAddr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;

/// Framing of captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Bare IP packets, version taken from the first nibble.
    RawIp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
    Other(u8),
}

/// What the observation side needs to know about one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub transport: TransportKind,
    pub source_port: Option<u16>,
    pub destination_port: Option<u16>,
    pub tcp_flags: Option<u8>,
    pub payload: Vec<u8>,
}

/// Decodes a captured frame. `None` means the frame carries no IP packet we
/// understand.
pub fn decode_frame(frame: &[u8], link: LinkType) -> Option<FrameSummary> {
    match link {
        LinkType::Ethernet => {
            let eth = EthernetPacket::new(frame)?;
            match eth.get_ethertype() {
                EtherTypes::Ipv4 => decode_ipv4(eth.payload()),
                EtherTypes::Ipv6 => decode_ipv6(eth.payload()),
                _ => None,
            }
        }
        LinkType::RawIp => match frame.first()? >> 4 {
            4 => decode_ipv4(frame),
            6 => decode_ipv6(frame),
            _ => None,
        },
    }
}

/// Just the `(source, destination)` pair of a captured frame.
pub fn extract_addresses(frame: &[u8], link: LinkType) -> Option<(IpAddr, IpAddr)> {
    decode_frame(frame, link).map(|s| (s.source, s.destination))
}

fn decode_ipv4(bytes: &[u8]) -> Option<FrameSummary> {
    let ip = Ipv4Packet::new(bytes)?;
    if ip.get_version() != 4 || ip.get_header_length() < 5 {
        return None;
    }
    Some(decode_transport(
        IpAddr::V4(ip.get_source()),
        IpAddr::V4(ip.get_destination()),
        ip.get_next_level_protocol(),
        ip.payload(),
    ))
}

fn decode_ipv6(bytes: &[u8]) -> Option<FrameSummary> {
    let ip = Ipv6Packet::new(bytes)?;
    if ip.get_version() != 6 {
        return None;
    }
    Some(decode_transport(
        IpAddr::V6(ip.get_source()),
        IpAddr::V6(ip.get_destination()),
        ip.get_next_header(),
        ip.payload(),
    ))
}

fn decode_transport(
    source: IpAddr,
    destination: IpAddr,
    protocol: IpNextHeaderProtocol,
    bytes: &[u8],
) -> FrameSummary {
    let mut summary = FrameSummary {
        source,
        destination,
        transport: TransportKind::Other(protocol.0),
        source_port: None,
        destination_port: None,
        tcp_flags: None,
        payload: Vec::new(),
    };

    match protocol {
        IpNextHeaderProtocols::Tcp => {
            summary.transport = TransportKind::Tcp;
            if let Some(tcp) = TcpPacket::new(bytes) {
                summary.source_port = Some(tcp.get_source());
                summary.destination_port = Some(tcp.get_destination());
                summary.tcp_flags = Some(tcp.get_flags());
                summary.payload = tcp.payload().to_vec();
            }
        }
        IpNextHeaderProtocols::Udp => {
            summary.transport = TransportKind::Udp;
            if let Some(udp) = UdpPacket::new(bytes) {
                summary.source_port = Some(udp.get_source());
                summary.destination_port = Some(udp.get_destination());
                summary.payload = udp.payload().to_vec();
            }
        }
        _ => summary.payload = bytes.to_vec(),
    }

    summary
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
