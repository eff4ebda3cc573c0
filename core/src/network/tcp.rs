//! Spoofed TCP segment sequences.
//!
//! A probe is a single data segment, optionally preceded by a SYN and an ACK
//! that a stateful middlebox would accept as a completed handshake. All three
//! share one [`HandshakeState`], so the data segment sits exactly where the
//! fake connection left off.

use std::net::IpAddr;
use std::thread;
use std::time::Duration;

use pnet::packet::tcp::TcpFlags;
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use bidi_common::config::TransmitMode;
use bidi_common::network::route::RoutingError;
use bidi_protocols::codec::{CodecError, HeaderStack, NetworkLayer, TransportLayer};
use bidi_protocols::tcp::{self as tcp_header, TcpLayer};

use super::{Addressing, Frame, FrameSink, encode_frame};
use crate::error::ProbeError;

pub const WINDOW: u16 = 502;
/// Lowest source port handed out; the range is `[MIN_SOURCE_PORT, 65535)`.
pub const MIN_SOURCE_PORT: u16 = 1000;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("source {src} and destination {destination} are different address families")]
    AddressFamilyMismatch { src: IpAddr, destination: IpAddr },
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Serialization(#[from] CodecError),
}

pub fn random_source_port<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    rng.random_range(MIN_SOURCE_PORT..u16::MAX)
}

/// Like [`random_source_port`], but never `service`, so the probe's own
/// packets cannot pass for replies from that port.
pub fn random_source_port_except<R: Rng + ?Sized>(rng: &mut R, service: u16) -> u16 {
    loop {
        let port: u16 = random_source_port(rng);
        if port != service {
            return port;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeState {
    pub source_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
}

impl HandshakeState {
    /// Draws port, sequence and acknowledgement, in that order.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let source_port: u16 = random_source_port(rng);
        let sequence: u32 = rng.random();
        let acknowledgement: u32 = rng.random();
        Self { source_port, sequence, acknowledgement }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Syn,
    Ack,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub stack: HeaderStack,
}

impl Segment {
    pub fn tcp(&self) -> Option<&TcpLayer> {
        match &self.stack.transport {
            TransportLayer::Tcp(layer) => Some(layer),
            TransportLayer::Udp(_) => None,
        }
    }
}

/// Builds the segment sequence for one probe: `[SYN, ACK, data]` with the
/// prelude, `[data]` without.
pub fn build_probe(
    addressing: &Addressing,
    destination_port: u16,
    payload: &[u8],
    state: &HandshakeState,
    send_syn_ack: bool,
) -> Result<Vec<Segment>, BuildError> {
    let (src, destination) = (addressing.source, addressing.destination);
    if src.is_ipv4() != destination.is_ipv4() {
        return Err(BuildError::AddressFamilyMismatch { src, destination });
    }

    let next_seq: u32 = state.sequence.wrapping_add(1);
    let segment = |kind: SegmentKind, sequence: u32, acknowledgement: u32, flags: u8, payload: &[u8]| Segment {
        kind,
        stack: HeaderStack {
            link: addressing.link,
            network: NetworkLayer::new(src, destination),
            transport: TransportLayer::Tcp(TcpLayer {
                source_port: state.source_port,
                destination_port,
                sequence,
                acknowledgement,
                flags,
                window: WINDOW,
            }),
            payload: payload.to_vec(),
        },
    };

    let mut segments: Vec<Segment> = Vec::with_capacity(3);
    if send_syn_ack {
        segments.push(segment(SegmentKind::Syn, state.sequence, 0, TcpFlags::SYN, &[][..]));
        segments.push(segment(SegmentKind::Ack, next_seq, state.acknowledgement, TcpFlags::ACK, &[][..]));
    }
    segments.push(segment(
        SegmentKind::Data,
        next_seq,
        state.acknowledgement,
        TcpFlags::PSH | TcpFlags::ACK,
        payload,
    ));
    Ok(segments)
}

/// Encodes every segment up front, then sends them in order, pausing
/// `syn_delay` after the SYN. Nothing is sent if any segment fails to encode.
pub fn send_segments(
    sink: &mut dyn FrameSink,
    segments: &[Segment],
    mode: TransmitMode,
    syn_delay: Duration,
) -> Result<usize, ProbeError> {
    let frames: Vec<Frame> = segments
        .iter()
        .map(|segment| encode_frame(&segment.stack, mode))
        .collect::<Result<_, _>>()?;

    for (segment, frame) in segments.iter().zip(&frames) {
        sink.send(frame)?;
        debug!(
            "Sent {} to {} ({} bytes): {}",
            segment.tcp().map_or_else(|| "segment".to_string(), |l| tcp_header::flags_label(l.flags)),
            segment.stack.network.destination,
            frame.bytes().len(),
            hex::encode(frame.bytes())
        );
        if segment.kind == SegmentKind::Syn && !syn_delay.is_zero() {
            thread::sleep(syn_delay);
        }
    }
    Ok(frames.len())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
