//! # Probe Target Model
//!
//! A target is one destination address paired with the domain name the probe
//! carries (DNS question, HTTP `Host`, TLS/QUIC SNI).
//!
//! Target lines are read from stdin and accept three shapes:
//! * `203.0.113.7` (crossed with the domains list)
//! * `203.0.113.7 example.com`
//! * `203.0.113.7,example.com`

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub destination: IpAddr,
    /// Empty when the line carried no domain and no domains list was given.
    pub domain: String,
    pub local_hint: Option<IpAddr>,
}

impl Target {
    pub fn new(destination: IpAddr, domain: impl Into<String>) -> Self {
        Self {
            destination,
            domain: domain.into(),
            local_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: Option<IpAddr>) -> Self {
        self.local_hint = hint;
        self
    }

    pub fn has_domain(&self) -> bool {
        !self.domain.is_empty()
    }

    /// The domain as printed in result lines.
    pub fn domain_label(&self) -> &str {
        if self.has_domain() { &self.domain } else { "-" }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.destination, self.domain_label())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, domain) = split_line(s)?;
        let destination: IpAddr = parse_address(address)?;
        Ok(Target::new(destination, domain.unwrap_or_default()))
    }
}

/// Turns one input line into targets.
///
/// A line with its own domain yields exactly one target. A bare address is
/// crossed with every entry of `domains`, or yields a single domainless target
/// when `domains` is empty. Blank lines and `#` comments yield nothing.
pub fn expand_line(line: &str, domains: &[String], hint: Option<IpAddr>) -> Result<Vec<Target>, String> {
    let line: &str = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    let (address, domain) = split_line(line)?;
    let destination: IpAddr = parse_address(address)?;

    let targets: Vec<Target> = match domain {
        Some(domain) => vec![Target::new(destination, domain).with_hint(hint)],
        None if domains.is_empty() => vec![Target::new(destination, "").with_hint(hint)],
        None => domains
            .iter()
            .map(|d| Target::new(destination, d.as_str()).with_hint(hint))
            .collect(),
    };

    Ok(targets)
}

/// Reads a domains list: one name per line, blanks and `#` comments skipped.
pub fn parse_domains(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.trim_end_matches('.').to_ascii_lowercase())
        .collect()
}

fn split_line(line: &str) -> Result<(&str, Option<String>), String> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());

    let address: &str = parts.next().ok_or_else(|| "empty target line".to_string())?;
    let domain: Option<String> = parts.next().map(|d| d.trim_end_matches('.').to_ascii_lowercase());

    if let Some(extra) = parts.next() {
        return Err(format!("unexpected field '{extra}' in target line: {line}"));
    }

    Ok((address, domain))
}

fn parse_address(s: &str) -> Result<IpAddr, String> {
    // tolerate bracketed IPv6 literals
    let s: &str = s.trim_start_matches('[').trim_end_matches(']');
    s.parse::<IpAddr>().map_err(|_| format!("invalid target address: {s}"))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
