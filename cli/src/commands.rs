pub mod list;
pub mod probe;

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use bidi_common::config::{Config, ProbeKind, TransmitMode};

#[derive(Parser)]
#[command(name = "bidi")]
#[command(about = "Crafts raw protocol probes to measure on-path interference.")]
pub struct CommandLine {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe targets read from stdin, one `addr [domain]` per line
    #[command(alias = "p")]
    Probe(ProbeArgs),
    /// Show probe types and the interfaces they can use
    #[command(alias = "l")]
    List,
}

/// Every option falls back to `Config::default()` when omitted.
#[derive(Args, Debug, Default)]
pub struct ProbeArgs {
    /// Probe type: dns, http, tls or quic
    #[arg(short = 't', long = "type")]
    pub probe: Option<ProbeKind>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Pause after each probe, per worker, in milliseconds
    #[arg(long = "delay")]
    pub probe_delay_ms: Option<u64>,

    /// Source address to probe from
    #[arg(short = 'l', long)]
    pub local_addr: Option<IpAddr>,

    /// Outbound interface
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Precede TCP payloads with a spoofed SYN and ACK
    #[arg(long)]
    pub syn_ack: bool,

    /// Pause between the spoofed SYN and ACK, in milliseconds
    #[arg(long)]
    pub syn_delay_ms: Option<u64>,

    /// Seed for every randomised probe field
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Transmit mode: link (Ethernet frames) or raw (IP raw sockets)
    #[arg(short, long)]
    pub mode: Option<TransmitMode>,

    /// Override the probe type's destination port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DNS query type
    #[arg(long)]
    pub qtype: Option<u16>,

    /// Wait for DNS responses
    #[arg(long)]
    pub read: bool,

    /// Response wait and capture grace period, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Domains crossed with every bare address
    #[arg(short, long)]
    pub domains: Option<PathBuf>,

    /// Do not listen for replies
    #[arg(long)]
    pub no_capture: bool,
}

impl ProbeArgs {
    pub fn to_config(&self) -> Config {
        let defaults = Config::default();
        Config {
            workers: self.workers.unwrap_or(defaults.workers).max(1),
            probe_delay: self.probe_delay_ms.map(Duration::from_millis).unwrap_or(defaults.probe_delay),
            local_addr: self.local_addr.or(defaults.local_addr),
            interface: self.interface.clone().unwrap_or(defaults.interface),
            send_syn_ack: self.syn_ack || defaults.send_syn_ack,
            syn_delay: self.syn_delay_ms.map(Duration::from_millis).unwrap_or(defaults.syn_delay),
            seed: self.seed.unwrap_or(defaults.seed),
            probe: self.probe.unwrap_or(defaults.probe),
            transmit_mode: self.mode.unwrap_or(defaults.transmit_mode),
            dst_port: self.port.or(defaults.dst_port),
            dns_qtype: self.qtype.unwrap_or(defaults.dns_qtype),
            dns_read: self.read || defaults.dns_read,
            read_timeout: self.timeout_ms.map(Duration::from_millis).unwrap_or(defaults.read_timeout),
            capture: !self.no_capture && defaults.capture,
        }
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
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

    fn parse(args: &[&str]) -> ProbeArgs {
        let cli = CommandLine::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Probe(args) => args,
            Commands::List => panic!("expected probe command"),
        }
    }

    #[test]
    fn omitted_options_keep_defaults() {
        assert_eq!(parse(&["bidi", "probe"]).to_config(), Config::default());
    }

    #[test]
    fn options_map_onto_config() {
        let config = parse(&[
            "bidi", "probe", "-t", "quic", "-w", "8", "--delay", "0", "-i", "wlan0", "--syn-ack",
            "--syn-delay-ms", "20", "-s", "9", "-m", "raw", "-p", "8443", "--no-capture",
        ])
        .to_config();

        assert_eq!(config.probe, ProbeKind::Quic);
        assert_eq!(config.workers, 8);
        assert_eq!(config.probe_delay, Duration::ZERO);
        assert_eq!(config.interface, "wlan0");
        assert!(config.send_syn_ack);
        assert_eq!(config.syn_delay, Duration::from_millis(20));
        assert_eq!(config.seed, 9);
        assert_eq!(config.transmit_mode, TransmitMode::Raw);
        assert_eq!(config.dst_port, Some(8443));
        assert!(!config.capture);
    }

    #[test]
    fn dns_options_and_verbosity() {
        let cli = CommandLine::try_parse_from(["bidi", "-vv", "p", "--qtype", "28", "--read", "--timeout-ms", "250"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Probe(args) = cli.command else { panic!("expected probe command") };
        let config = args.to_config();
        assert_eq!(config.dns_qtype, 28);
        assert!(config.dns_read);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
    }

    #[test]
    fn workers_are_at_least_one() {
        assert_eq!(parse(&["bidi", "probe", "-w", "0"]).to_config().workers, 1);
    }

    #[test]
    fn unknown_probe_type_is_rejected() {
        assert!(CommandLine::try_parse_from(["bidi", "probe", "-t", "smtp"]).is_err());
    }
}
