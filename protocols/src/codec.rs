//! # Layered Header Codec
//!
//! A [`HeaderStack`] is an optional Ethernet header, one IP header, one TCP or
//! UDP header and a payload. Serialization fills every length field from the
//! layers below it. Checksums are never implicit: each call names a
//! [`ChecksumMode`], because link-layer injection and raw sockets split the
//! checksum work differently between us and the kernel.

mod decode;

use std::net::IpAddr;

use pnet::packet::ethernet::{EtherType, EtherTypes};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use thiserror::Error;

pub use decode::{FrameSummary, LinkType, TransportKind, decode_frame, extract_addresses};

use crate::ethernet::{self, EthernetLayer};
use crate::ip;
use crate::tcp::{self, TcpLayer};
use crate::udp::{self, UdpLayer};
use crate::{ETH_HDR_LEN, IPV4_HDR_LEN, IPV6_HDR_LEN, TCP_HDR_LEN, UDP_HDR_LEN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("source {src} and destination {destination} are different address families")]
    FamilyMismatch { src: IpAddr, destination: IpAddr },
    #[error("{layer} length {length} does not fit its 16-bit length field")]
    PayloadTooLarge { layer: &'static str, length: usize },
    #[error("header stack has no link layer")]
    MissingLinkLayer,
    #[error("buffer too small for {0} header")]
    Buffer(&'static str),
}

/// Who computes which checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// IPv4 header checksum and transport checksum are both computed here.
    Full,
    /// Transport checksum is computed here; the IPv4 header checksum is left
    /// zero for a raw socket with `IP_HDRINCL` to fill in.
    KernelIp,
    /// No checksum is computed at all.
    Skip,
}

/// Outermost layer written by [`HeaderStack::serialize_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Link,
    Network,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkLayer {
    pub source: IpAddr,
    pub destination: IpAddr,
    /// TTL for IPv4, hop limit for IPv6.
    pub ttl: u8,
    /// IPv4 identification. Unused for IPv6.
    pub identification: u16,
}

impl NetworkLayer {
    pub fn new(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source,
            destination,
            ttl: ip::DEFAULT_TTL,
            identification: 0,
        }
    }

    fn header_len(&self) -> usize {
        if self.source.is_ipv4() { IPV4_HDR_LEN } else { IPV6_HDR_LEN }
    }

    fn ethertype(&self) -> EtherType {
        if self.source.is_ipv4() { EtherTypes::Ipv4 } else { EtherTypes::Ipv6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp(TcpLayer),
    Udp(UdpLayer),
}

impl TransportLayer {
    fn header_len(&self) -> usize {
        match self {
            TransportLayer::Tcp(_) => TCP_HDR_LEN,
            TransportLayer::Udp(_) => UDP_HDR_LEN,
        }
    }

    pub fn protocol(&self) -> IpNextHeaderProtocol {
        match self {
            TransportLayer::Tcp(_) => IpNextHeaderProtocols::Tcp,
            TransportLayer::Udp(_) => IpNextHeaderProtocols::Udp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderStack {
    pub link: Option<EthernetLayer>,
    pub network: NetworkLayer,
    pub transport: TransportLayer,
    pub payload: Vec<u8>,
}

impl HeaderStack {
    /// Serializes every layer present, starting at the link layer when the
    /// stack has one.
    pub fn serialize(&self, mode: ChecksumMode) -> Result<Vec<u8>, CodecError> {
        let outermost: Layer = if self.link.is_some() { Layer::Link } else { Layer::Network };
        self.serialize_from(outermost, mode)
    }

    pub fn serialize_from(&self, outermost: Layer, mode: ChecksumMode) -> Result<Vec<u8>, CodecError> {
        let (src, destination) = (self.network.source, self.network.destination);
        if src.is_ipv4() != destination.is_ipv4() {
            return Err(CodecError::FamilyMismatch { src, destination });
        }

        let transport_len: usize = self.transport.header_len() + self.payload.len();
        let network_len: usize = self.network.header_len() + transport_len;
        let link_len: usize = match outermost {
            Layer::Link => ETH_HDR_LEN,
            Layer::Network | Layer::Transport => 0,
        };
        let ip_len: usize = match outermost {
            Layer::Link | Layer::Network => self.network.header_len(),
            Layer::Transport => 0,
        };

        // IPv4 total length covers its own header; IPv6 payload length does not.
        let length_field: usize = if src.is_ipv4() { network_len } else { transport_len };
        let length_field: u16 = u16::try_from(length_field).map_err(|_| CodecError::PayloadTooLarge {
            layer: if src.is_ipv4() { "ipv4" } else { "ipv6" },
            length: length_field,
        })?;

        let mut buffer: Vec<u8> = vec![0u8; link_len + ip_len + transport_len];

        if outermost == Layer::Link {
            let link: &EthernetLayer = self.link.as_ref().ok_or(CodecError::MissingLinkLayer)?;
            ethernet::make_header(&mut buffer[..ETH_HDR_LEN], link, self.network.ethertype())?;
        }

        if ip_len > 0 {
            let ip_buf: &mut [u8] = &mut buffer[link_len..];
            match (src, destination) {
                (IpAddr::V4(s), IpAddr::V4(d)) => ip::create_ipv4_header(
                    ip_buf,
                    length_field,
                    self.network.identification,
                    self.network.ttl,
                    self.transport.protocol(),
                    s,
                    d,
                    mode == ChecksumMode::Full,
                )?,
                (IpAddr::V6(s), IpAddr::V6(d)) => ip::create_ipv6_header(
                    ip_buf,
                    length_field,
                    self.network.ttl,
                    self.transport.protocol(),
                    s,
                    d,
                )?,
                _ => return Err(CodecError::FamilyMismatch { src, destination }),
            }
        }

        let pseudo: Option<(IpAddr, IpAddr)> = match mode {
            ChecksumMode::Full | ChecksumMode::KernelIp => Some((src, destination)),
            ChecksumMode::Skip => None,
        };
        let transport_buf: &mut [u8] = &mut buffer[link_len + ip_len..];
        match &self.transport {
            TransportLayer::Tcp(layer) => tcp::write_segment(transport_buf, layer, &self.payload, pseudo)?,
            TransportLayer::Udp(layer) => udp::write_datagram(transport_buf, layer, &self.payload, pseudo)?,
        }

        Ok(buffer)
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
