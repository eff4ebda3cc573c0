//! # Outgoing Route Resolution
//!
//! Answers one question for the probe builders: *which source address and
//! which next-hop hardware address does a frame to `destination` need when it
//! leaves through interface `name`?*
//!
//! The lookup itself is behind the [`RouteTable`] trait. [`SystemRouteTable`]
//! reads the host's tables, while tests plug in a fixed, in-memory table.

mod system;

use std::net::IpAddr;

use pnet::datalink::NetworkInterface;
use pnet::util::MacAddr;
use thiserror::Error;
use tracing::debug;

pub use system::SystemRouteTable;

/// Everything a link-layer probe needs to address a frame.
#[derive(Debug, Clone)]
pub struct Route {
    pub interface: NetworkInterface,
    pub source: IpAddr,
    pub next_hop: IpAddr,
    pub next_hop_mac: MacAddr,
}

impl Route {
    /// Hardware address of the outgoing interface. Loopback devices report
    /// the all-zero address.
    pub fn source_mac(&self) -> MacAddr {
        self.interface.mac.unwrap_or_else(MacAddr::zero)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("unknown interface {0}")]
    UnknownInterface(String),
    #[error("no route to {destination} via {interface}")]
    NoRoute { destination: IpAddr, interface: String },
    #[error("no source address of the right family for {0}")]
    NoSourceAddress(IpAddr),
    #[error("no hardware address for next hop {next_hop} on {interface}")]
    NoHardwareAddress { next_hop: IpAddr, interface: String },
    #[error("interface {0} has no hardware address")]
    NoInterfaceHardwareAddress(String),
    #[error("raw ipv6 sockets send from the kernel's chosen source, cannot use {0}")]
    SourceHintUnsupported(IpAddr),
}

/// Read-only view of the host's interfaces, routes and neighbour cache.
pub trait RouteTable: Send + Sync {
    fn interfaces(&self) -> Vec<NetworkInterface>;

    /// Source address the OS would pick for `destination`, if any.
    fn preferred_source(&self, destination: IpAddr) -> Option<IpAddr>;

    /// Next hop for a destination that is not on-link for `interface`.
    fn next_hop(&self, interface: &str, destination: IpAddr) -> Option<IpAddr>;

    /// Cached hardware address of a neighbour on `interface`.
    fn neighbor(&self, interface: &str, address: IpAddr) -> Option<MacAddr>;
}

/// Full resolution for link-layer transmission.
pub fn resolve(
    table: &dyn RouteTable,
    interface_name: &str,
    source_hint: Option<IpAddr>,
    destination: IpAddr,
) -> Result<Route, RoutingError> {
    let interface: NetworkInterface = find_interface(table, interface_name)?;
    let source: IpAddr = select_source(table, &interface, source_hint, destination)?;

    let next_hop: IpAddr = if interface.is_loopback() || is_on_link(&interface, destination) {
        destination
    } else {
        table
            .next_hop(&interface.name, destination)
            .ok_or_else(|| RoutingError::NoRoute {
                destination,
                interface: interface.name.clone(),
            })?
    };

    let next_hop_mac: MacAddr = if interface.is_loopback() {
        MacAddr::zero()
    } else if interface.mac.is_none() {
        return Err(RoutingError::NoInterfaceHardwareAddress(interface.name.clone()));
    } else {
        table
            .neighbor(&interface.name, next_hop)
            .ok_or_else(|| RoutingError::NoHardwareAddress {
                next_hop,
                interface: interface.name.clone(),
            })?
    };

    debug!(
        "Route to {destination} via {} from {source}, next hop {next_hop} ({next_hop_mac})",
        interface.name
    );

    Ok(Route {
        interface,
        source,
        next_hop,
        next_hop_mac,
    })
}

/// Source-only resolution for network-layer transmission, where the OS
/// supplies the link layer.
pub fn resolve_source(
    table: &dyn RouteTable,
    interface_name: &str,
    source_hint: Option<IpAddr>,
    destination: IpAddr,
) -> Result<IpAddr, RoutingError> {
    let interface: NetworkInterface = find_interface(table, interface_name)?;
    select_source(table, &interface, source_hint, destination)
}

pub fn find_interface(table: &dyn RouteTable, name: &str) -> Result<NetworkInterface, RoutingError> {
    table
        .interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| RoutingError::UnknownInterface(name.to_string()))
}

/// Picks the probe's source address.
///
/// A hint of the destination's family wins. A hint of the other family is
/// dropped, then the OS preference is asked, then the interface's own
/// addresses are searched.
pub fn select_source(
    table: &dyn RouteTable,
    interface: &NetworkInterface,
    hint: Option<IpAddr>,
    destination: IpAddr,
) -> Result<IpAddr, RoutingError> {
    if let Some(hint) = hint.filter(|h| same_family(*h, destination)) {
        return Ok(hint);
    }

    if let Some(preferred) = table
        .preferred_source(destination)
        .filter(|p| same_family(*p, destination))
    {
        return Ok(preferred);
    }

    let candidates: Vec<IpAddr> = interface
        .ips
        .iter()
        .map(|net| net.ip())
        .filter(|ip| same_family(*ip, destination))
        .collect();

    candidates
        .iter()
        .find(|ip| !is_link_local(**ip))
        .or_else(|| candidates.first())
        .copied()
        .ok_or(RoutingError::NoSourceAddress(destination))
}

/// True when `target` lies inside one of the interface's own networks.
pub fn is_on_link(interface: &NetworkInterface, target: IpAddr) -> bool {
    if matches!(target, IpAddr::V6(v6) if v6.is_unicast_link_local()) {
        return true;
    }
    interface
        .ips
        .iter()
        .any(|ip_net| same_family(ip_net.ip(), target) && ip_net.contains(target))
}

pub fn same_family(a: IpAddr, b: IpAddr) -> bool {
    a.is_ipv4() == b.is_ipv4()
}

fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unicast_link_local(),
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
