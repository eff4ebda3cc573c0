//! # Probe Types
//!
//! Each probe type is a [`Prober`]: it knows how to turn a [`Target`] into
//! bytes on the wire and how to recognise replies in captured frames.
//! Probers are stateless and shared by every worker; all per-worker state
//! (seeded generator, transmitter, route table) travels in a
//! [`ProbeContext`].

pub mod dns;
pub mod http;
pub mod quic;
pub mod tls;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use bidi_common::config::{Config, ProbeKind, TransmitMode};
use bidi_common::network::route::RouteTable;
use bidi_common::network::target::Target;
use bidi_protocols::codec::{FrameSummary, TransportKind};
use bidi_protocols::dns::DnsSummary;
use bidi_protocols::tcp::flags_label;

use crate::error::{PayloadError, ProbeError};
use crate::network::tcp::{self, HandshakeState};
use crate::network::{FrameSink, TransmitError, resolve_addressing};

/// Per-attempt view of a worker's state.
pub struct ProbeContext<'a> {
    pub rng: &'a mut StdRng,
    pub routes: &'a dyn RouteTable,
    pub sink: Option<&'a mut (dyn FrameSink + 'static)>,
}

impl ProbeContext<'_> {
    pub fn sink(&mut self) -> Result<&mut (dyn FrameSink + 'static), ProbeError> {
        self.sink
            .as_deref_mut()
            .ok_or(ProbeError::Transmit(TransmitError::NoSink))
    }
}

/// A named setting of a probe type, shown by `bidi list` and at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOption {
    pub name: &'static str,
    pub value: String,
}

impl ProbeOption {
    pub fn new(name: &'static str, value: impl ToString) -> Self {
        Self { name, value: value.to_string() }
    }
}

impl fmt::Display for ProbeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Fire-and-forget probe; `frames` went out.
    Sent { frames: usize },
    /// The probe read a DNS response back.
    Answered(DnsSummary),
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Sent { .. } => f.write_str("sent"),
            ProbeStatus::Answered(summary) => write!(f, "{summary}"),
        }
    }
}

/// Capture-side match for a probe type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub protocol: &'static str,
    pub source: IpAddr,
    pub detail: String,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESULT {} {} {}", self.protocol, self.source, self.detail)
    }
}

/// Exactly one per target attempt.
#[derive(Debug)]
pub struct ProbeOutcome {
    pub worker: usize,
    pub target: Target,
    pub result: Result<ProbeStatus, ProbeError>,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RESULT {} {} ", self.target.destination, self.target.domain_label())?;
        match &self.result {
            Ok(status) => write!(f, "{status}"),
            Err(e) => write!(f, "error {}: {e}", e.step()),
        }
    }
}

pub trait Prober: Send + Sync {
    fn kind(&self) -> ProbeKind;

    fn options(&self) -> Vec<ProbeOption>;

    /// Whether `send_probe` waits for a response.
    fn should_read(&self) -> bool;

    /// Whether this type writes through a [`FrameSink`]. Types that use an
    /// ordinary socket do not need one opened for them.
    fn needs_sink(&self) -> bool {
        true
    }

    fn send_probe(&self, target: &Target, ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError>;

    fn observe(&self, frame: &FrameSummary) -> Option<Observation>;
}

/// Constructs the prober for a [`ProbeKind`].
pub trait BuildProber {
    fn build(&self, config: &Config) -> Arc<dyn Prober>;
}

impl BuildProber for ProbeKind {
    fn build(&self, config: &Config) -> Arc<dyn Prober> {
        match self {
            ProbeKind::Dns => Arc::new(dns::DnsProber::from_config(config)),
            ProbeKind::Http => Arc::new(http::HttpProber::from_config(config)),
            ProbeKind::Tls => Arc::new(tls::TlsProber::from_config(config)),
            ProbeKind::Quic => Arc::new(quic::QuicProber::from_config(config)),
        }
    }
}

pub fn build_prober(config: &Config) -> Arc<dyn Prober> {
    config.probe.build(config)
}

/// Generator for one worker. Distinct workers get distinct streams; the same
/// seed and worker index always give the same stream.
pub fn seeded_rng(seed: u64, worker: usize) -> StdRng {
    const STREAM_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;
    StdRng::seed_from_u64(seed ^ (worker as u64).wrapping_mul(STREAM_STRIDE))
}

pub(crate) fn require_domain(target: &Target) -> Result<&str, ProbeError> {
    if target.has_domain() {
        Ok(&target.domain)
    } else {
        Err(PayloadError::MissingDomain.into())
    }
}

/// Settings shared by the probe types that write crafted segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoofSettings {
    pub port: u16,
    pub interface: String,
    pub mode: TransmitMode,
    pub send_syn_ack: bool,
    pub syn_delay: Duration,
}

impl SpoofSettings {
    pub fn from_config(config: &Config, default_port: u16) -> Self {
        Self {
            port: config.dst_port.unwrap_or(default_port),
            interface: config.interface.clone(),
            mode: config.transmit_mode,
            send_syn_ack: config.send_syn_ack,
            syn_delay: config.syn_delay,
        }
    }

    pub fn options(&self) -> Vec<ProbeOption> {
        vec![
            ProbeOption::new("port", self.port),
            ProbeOption::new("interface", &self.interface),
            ProbeOption::new("mode", self.mode),
            ProbeOption::new("syn_ack", self.send_syn_ack),
            ProbeOption::new("syn_delay_ms", self.syn_delay.as_millis()),
        ]
    }

    /// Resolves addressing, draws a handshake and sends the segment sequence
    /// carrying `payload`.
    pub fn send_tcp(&self, target: &Target, payload: &[u8], ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError> {
        let addressing = resolve_addressing(
            ctx.routes,
            &self.interface,
            target.local_hint,
            target.destination,
            self.mode,
        )?;
        let state: HandshakeState = HandshakeState::generate(ctx.rng);
        let segments = tcp::build_probe(&addressing, self.port, payload, &state, self.send_syn_ack)?;
        let frames: usize = tcp::send_segments(ctx.sink()?, &segments, self.mode, self.syn_delay)?;
        Ok(ProbeStatus::Sent { frames })
    }

    /// TCP frames coming back from the probed port.
    pub fn observe_tcp(&self, protocol: &'static str, frame: &FrameSummary) -> Option<Observation> {
        if frame.transport != TransportKind::Tcp
            || frame.source_port != Some(self.port)
            || frame.destination_port == Some(self.port)
        {
            return None;
        }
        Some(Observation {
            protocol,
            source: frame.source,
            detail: flags_label(frame.tcp_flags?),
        })
    }
}

/// A worker's private probing state. Moved onto a blocking thread for each
/// attempt and handed back afterwards.
pub struct ProbeSession {
    worker: usize,
    prober: Arc<dyn Prober>,
    routes: Arc<dyn RouteTable>,
    sink: Option<Box<dyn FrameSink>>,
    rng: StdRng,
}

impl ProbeSession {
    pub fn new(
        worker: usize,
        prober: Arc<dyn Prober>,
        routes: Arc<dyn RouteTable>,
        sink: Option<Box<dyn FrameSink>>,
        seed: u64,
    ) -> Self {
        Self {
            worker,
            prober,
            routes,
            sink,
            rng: seeded_rng(seed, worker),
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn run(&mut self, target: &Target) -> Result<ProbeStatus, ProbeError> {
        let mut ctx = ProbeContext {
            rng: &mut self.rng,
            routes: self.routes.as_ref(),
            sink: self.sink.as_deref_mut(),
        };
        self.prober.send_probe(target, &mut ctx)
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
