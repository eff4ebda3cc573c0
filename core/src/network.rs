//! Frames and the sinks that put them on the wire.
//!
//! There are two send paths and the caller always names one:
//! * link mode writes whole Ethernet frames through a datalink channel and
//!   needs a resolved next-hop hardware address;
//! * raw mode writes IP packets through a raw socket and lets the OS pick the
//!   link layer.

pub mod channel;
pub mod tcp;
pub mod transport;

use std::io;
use std::net::IpAddr;

use pnet::packet::ip::IpNextHeaderProtocol;
use thiserror::Error;

use bidi_common::config::TransmitMode;
use bidi_common::network::route::{self, RouteTable, RoutingError};
use bidi_protocols::codec::{ChecksumMode, CodecError, HeaderStack, Layer};
use bidi_protocols::ethernet::EthernetLayer;

/// A serialized probe ready for a [`FrameSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Complete Ethernet frame.
    Link(Vec<u8>),
    /// IPv4 packet including its header, or for IPv6 the transport segment
    /// alone since the kernel writes that header itself.
    Network {
        destination: IpAddr,
        protocol: IpNextHeaderProtocol,
        bytes: Vec<u8>,
    },
}

impl Frame {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Frame::Link(bytes) => bytes,
            Frame::Network { bytes, .. } => bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("opening {channel}: {source}")]
    Open { channel: String, source: io::Error },
    #[error("non-ethernet channel for {0}")]
    UnsupportedChannel(String),
    #[error("{sink} sink cannot send a {frame} frame")]
    WrongFrame { sink: &'static str, frame: &'static str },
    #[error("send buffer full")]
    BufferFull,
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("no transmitter configured for this worker")]
    NoSink,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Anything that can put a finished [`Frame`] on the wire.
///
/// One sink belongs to one worker; nothing here is shared.
pub trait FrameSink: Send {
    fn send(&mut self, frame: &Frame) -> Result<(), TransmitError>;
}

/// Addresses needed to build one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    pub source: IpAddr,
    pub destination: IpAddr,
    /// Present only in link mode.
    pub link: Option<EthernetLayer>,
}

/// Resolves what the chosen transmit mode needs: the full route in link
/// mode, just the source address in raw mode.
pub fn resolve_addressing(
    routes: &dyn RouteTable,
    interface: &str,
    source_hint: Option<IpAddr>,
    destination: IpAddr,
    mode: TransmitMode,
) -> Result<Addressing, RoutingError> {
    match mode {
        TransmitMode::Link => {
            let resolved = route::resolve(routes, interface, source_hint, destination)?;
            Ok(Addressing {
                source: resolved.source,
                destination,
                link: Some(EthernetLayer {
                    source: resolved.source_mac(),
                    destination: resolved.next_hop_mac,
                }),
            })
        }
        TransmitMode::Raw => {
            let source: IpAddr = route::resolve_source(routes, interface, source_hint, destination)?;
            // The kernel writes the IPv6 header with its own source, and the
            // transport checksum has to cover that address.
            if destination.is_ipv6() && source_hint == Some(source) && routes.preferred_source(destination) != Some(source) {
                return Err(RoutingError::SourceHintUnsupported(source));
            }
            Ok(Addressing { source, destination, link: None })
        }
    }
}

/// Serializes a header stack for the given transmit mode.
///
/// Link frames carry every checksum. Raw IPv4 leaves the IP header checksum
/// to the kernel. Raw IPv6 only emits the transport segment.
pub fn encode_frame(stack: &HeaderStack, mode: TransmitMode) -> Result<Frame, CodecError> {
    match mode {
        TransmitMode::Link => {
            if stack.link.is_none() {
                return Err(CodecError::MissingLinkLayer);
            }
            Ok(Frame::Link(stack.serialize_from(Layer::Link, ChecksumMode::Full)?))
        }
        TransmitMode::Raw => {
            let destination: IpAddr = stack.network.destination;
            let bytes: Vec<u8> = if destination.is_ipv4() {
                stack.serialize_from(Layer::Network, ChecksumMode::KernelIp)?
            } else {
                stack.serialize_from(Layer::Transport, ChecksumMode::Full)?
            };
            Ok(Frame::Network {
                destination,
                protocol: stack.transport.protocol(),
                bytes,
            })
        }
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
