use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Every probe type the engine knows how to craft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Dns,
    Http,
    Tls,
    Quic,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] = [ProbeKind::Dns, ProbeKind::Http, ProbeKind::Tls, ProbeKind::Quic];

    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::Dns => "dns",
            ProbeKind::Http => "http",
            ProbeKind::Tls => "tls",
            ProbeKind::Quic => "quic",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProbeKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown probe type: {s}"))
    }
}

/// How finished frames leave the host.
///
/// * `Link` writes whole Ethernet frames through a capture/inject handle and
///   therefore needs the next hop's hardware address.
/// * `Raw` writes IP packets through a raw socket and lets the OS supply the
///   link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmitMode {
    #[default]
    Link,
    Raw,
}

impl FromStr for TransmitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "link" => Ok(TransmitMode::Link),
            "raw" => Ok(TransmitMode::Raw),
            other => Err(format!("unknown transmit mode: {other}")),
        }
    }
}

impl fmt::Display for TransmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitMode::Link => f.write_str("link"),
            TransmitMode::Raw => f.write_str("raw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of parallel probe workers.
    pub workers: usize,
    /// Pause after every probe a worker sends.
    pub probe_delay: Duration,
    /// Source address override. Ignored for destinations of the other family.
    pub local_addr: Option<IpAddr>,
    /// Outbound interface name.
    pub interface: String,
    /// Send a spoofed SYN and ACK ahead of every TCP data segment.
    pub send_syn_ack: bool,
    /// Gap between the spoofed SYN and ACK.
    pub syn_delay: Duration,
    /// Seed for every port, sequence number and random payload field.
    pub seed: u64,
    pub probe: ProbeKind,
    pub transmit_mode: TransmitMode,
    /// Overrides the probe type's usual destination port.
    pub dst_port: Option<u16>,
    /// DNS query type (1 = A, 28 = AAAA).
    pub dns_qtype: u16,
    /// Wait for the DNS answer on the sending socket.
    pub dns_read: bool,
    /// Upper bound on any read that waits for a reply.
    pub read_timeout: Duration,
    /// Run the capture listener next to the workers.
    pub capture: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 50,
            probe_delay: Duration::from_secs(5),
            local_addr: None,
            interface: "eth0".to_string(),
            send_syn_ack: false,
            syn_delay: Duration::ZERO,
            seed: 0,
            probe: ProbeKind::Dns,
            transmit_mode: TransmitMode::Link,
            dst_port: None,
            dns_qtype: 1,
            dns_read: false,
            read_timeout: Duration::from_secs(5),
            capture: true,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_kind_parses_case_insensitively() {
        assert_eq!("QUIC".parse::<ProbeKind>(), Ok(ProbeKind::Quic));
        assert_eq!(" tls ".parse::<ProbeKind>(), Ok(ProbeKind::Tls));
        assert!("smtp".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn probe_kind_names_round_trip() {
        for kind in ProbeKind::ALL {
            assert_eq!(kind.to_string().parse::<ProbeKind>(), Ok(kind));
        }
    }

    #[test]
    fn transmit_mode_parses() {
        assert_eq!("raw".parse::<TransmitMode>(), Ok(TransmitMode::Raw));
        assert_eq!("Link".parse::<TransmitMode>(), Ok(TransmitMode::Link));
        assert!("pcap".parse::<TransmitMode>().is_err());
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.workers, 50);
        assert_eq!(cfg.probe_delay, Duration::from_secs(5));
        assert_eq!(cfg.interface, "eth0");
        assert_eq!(cfg.probe, ProbeKind::Dns);
        assert_eq!(cfg.dns_qtype, 1);
        assert!(!cfg.send_syn_ack);
    }
}
