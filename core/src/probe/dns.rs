use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::debug;

use bidi_common::config::{Config, ProbeKind};
use bidi_common::network::route::same_family;
use bidi_common::network::target::Target;
use bidi_protocols::codec::{FrameSummary, TransportKind};
use bidi_protocols::dns::{self, DNS_PORT, DnsSummary};

use super::{Observation, ProbeContext, ProbeOption, ProbeStatus, Prober, require_domain};
use crate::error::ProbeError;
use crate::network::TransmitError;

const MAX_RESPONSE_LEN: usize = 4096;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Recursive query over an ordinary UDP socket bound to the source hint.
pub struct DnsProber {
    port: u16,
    qtype: u16,
    read: bool,
    timeout: Duration,
}

impl DnsProber {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.dst_port.unwrap_or(DNS_PORT),
            qtype: config.dns_qtype,
            read: config.dns_read,
            timeout: config.read_timeout,
        }
    }

    fn bind_address(target: &Target) -> SocketAddr {
        match target.local_hint {
            Some(hint) if same_family(hint, target.destination) => SocketAddr::new(hint, 0),
            _ if target.destination.is_ipv4() => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            _ => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        }
    }

    /// Waits for the response to `id` from `server`, skipping anything else
    /// until the timeout runs out.
    fn read_response(&self, socket: &UdpSocket, server: SocketAddr, id: u16) -> Result<DnsSummary, ProbeError> {
        let deadline: Instant = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_RESPONSE_LEN];
        loop {
            let remaining: Duration = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProbeError::Read(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response from {server} within {:?}", self.timeout),
                )));
            }
            socket
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
                .map_err(ProbeError::Read)?;

            let (len, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
                Err(e) => return Err(ProbeError::Read(e)),
            };
            if from != server {
                continue;
            }
            match dns::summarize_response(&buf[..len]) {
                Some(summary) if summary.id == id => return Ok(summary),
                _ => debug!("Ignoring unrelated datagram from {from}"),
            }
        }
    }
}

impl Prober for DnsProber {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Dns
    }

    fn options(&self) -> Vec<ProbeOption> {
        vec![
            ProbeOption::new("port", self.port),
            ProbeOption::new("qtype", self.qtype),
            ProbeOption::new("read", self.read),
            ProbeOption::new("timeout_ms", self.timeout.as_millis()),
        ]
    }

    fn should_read(&self) -> bool {
        self.read
    }

    fn needs_sink(&self) -> bool {
        false
    }

    fn send_probe(&self, target: &Target, ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError> {
        let id: u16 = ctx.rng.random();
        let query: Vec<u8> = dns::create_query(require_domain(target)?, self.qtype, id)?;
        let server = SocketAddr::new(target.destination, self.port);

        let socket: UdpSocket = UdpSocket::bind(Self::bind_address(target)).map_err(TransmitError::Io)?;
        socket.send_to(&query, server).map_err(TransmitError::Io)?;
        debug!("Sent DNS query {id} to {server}: {}", hex::encode(&query));

        if !self.read {
            return Ok(ProbeStatus::Sent { frames: 1 });
        }
        Ok(ProbeStatus::Answered(self.read_response(&socket, server, id)?))
    }

    fn observe(&self, frame: &FrameSummary) -> Option<Observation> {
        if frame.transport != TransportKind::Udp || frame.source_port != Some(self.port) {
            return None;
        }
        let summary: DnsSummary = dns::summarize_response(&frame.payload)?;
        Some(Observation {
            protocol: "DNS",
            source: frame.source,
            detail: format!("{} {summary}", summary.qname),
        })
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
