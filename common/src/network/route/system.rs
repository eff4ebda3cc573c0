use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, UdpSocket};

use pnet::datalink::{self, NetworkInterface};
use pnet::util::MacAddr;

#[cfg(target_os = "linux")]
use linux_impl as platform;
#[cfg(target_os = "macos")]
use macos_impl as platform;
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
use fallback_impl as platform;

use super::RouteTable;

/// Route table backed by the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRouteTable;

impl RouteTable for SystemRouteTable {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        datalink::interfaces()
    }

    fn preferred_source(&self, destination: IpAddr) -> Option<IpAddr> {
        // connect() on a UDP socket only consults the routing table, nothing is sent
        let bind_addr: &str = if destination.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket: UdpSocket = UdpSocket::bind(bind_addr).ok()?;
        socket.connect((destination, 53)).ok()?;
        socket.local_addr().ok().map(|s| s.ip())
    }

    fn next_hop(&self, interface: &str, destination: IpAddr) -> Option<IpAddr> {
        platform::next_hop(interface, destination)
    }

    fn neighbor(&self, interface: &str, address: IpAddr) -> Option<MacAddr> {
        platform::neighbor(interface, address)
    }
}

/// Longest-prefix match over `/proc/net/route`. A zero gateway means the
/// destination is on-link.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ipv4_routes(table: &str, interface: &str, destination: Ipv4Addr) -> Option<Ipv4Addr> {
    const RTF_UP: u32 = 0x1;

    let parse_hex = |field: &str| -> Option<Ipv4Addr> {
        u32::from_str_radix(field, 16)
            .ok()
            .map(|v| Ipv4Addr::from(v.to_ne_bytes()))
    };

    let dest_bits: u32 = u32::from(destination);
    let mut best: Option<(u32, u32, Ipv4Addr)> = None;

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 || fields[0] != interface {
            continue;
        }
        let flags: u32 = u32::from_str_radix(fields[3], 16).unwrap_or(0);
        if flags & RTF_UP == 0 {
            continue;
        }
        let (Some(net), Some(gateway), Some(mask)) =
            (parse_hex(fields[1]), parse_hex(fields[2]), parse_hex(fields[7]))
        else {
            continue;
        };
        let metric: u32 = fields[6].parse().unwrap_or(u32::MAX);
        let mask_bits: u32 = u32::from(mask);
        if dest_bits & mask_bits != u32::from(net) {
            continue;
        }

        let prefix: u32 = mask_bits.count_ones();
        let better: bool = match best {
            None => true,
            Some((p, m, _)) => prefix > p || (prefix == p && metric < m),
        };
        if better {
            let hop: Ipv4Addr = if gateway.is_unspecified() { destination } else { gateway };
            best = Some((prefix, metric, hop));
        }
    }

    best.map(|(_, _, hop)| hop)
}

/// Longest-prefix match over `/proc/net/ipv6_route`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ipv6_routes(table: &str, interface: &str, destination: Ipv6Addr) -> Option<Ipv6Addr> {
    const RTF_UP: u32 = 0x1;
    const RTF_REJECT: u32 = 0x200;

    let dest_bits: u128 = u128::from(destination);
    let mut best: Option<(u32, u32, Ipv6Addr)> = None;

    for line in table.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || fields[9] != interface {
            continue;
        }
        let (Ok(net), Ok(prefix), Ok(hop), Ok(metric), Ok(flags)) = (
            u128::from_str_radix(fields[0], 16),
            u32::from_str_radix(fields[1], 16),
            u128::from_str_radix(fields[4], 16),
            u32::from_str_radix(fields[5], 16),
            u32::from_str_radix(fields[8], 16),
        ) else {
            continue;
        };
        if flags & RTF_UP == 0 || flags & RTF_REJECT != 0 || prefix > 128 {
            continue;
        }
        let mask: u128 = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
        if dest_bits & mask != net & mask {
            continue;
        }

        let better: bool = match best {
            None => true,
            Some((p, m, _)) => prefix > p || (prefix == p && metric < m),
        };
        if better {
            let hop: Ipv6Addr = if hop == 0 { destination } else { Ipv6Addr::from(hop) };
            best = Some((prefix, metric, hop));
        }
    }

    best.map(|(_, _, hop)| hop)
}

/// Looks up `address` in `/proc/net/arp`. Incomplete entries are skipped.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_arp_table(table: &str, interface: &str, address: Ipv4Addr) -> Option<MacAddr> {
    const ATF_COM: u32 = 0x2;

    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 || fields[5] != interface {
            return None;
        }
        if fields[0].parse::<Ipv4Addr>().ok()? != address {
            return None;
        }
        let flags: u32 = u32::from_str_radix(fields[2].trim_start_matches("0x"), 16).ok()?;
        if flags & ATF_COM == 0 {
            return None;
        }
        fields[3].parse::<MacAddr>().ok().filter(|mac| *mac != MacAddr::zero())
    })
}

/// Parses `ip -6 neigh show dev <iface>` output.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ip_neigh(output: &str, address: Ipv6Addr) -> Option<MacAddr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        if tokens.next()?.parse::<Ipv6Addr>().ok()? != address {
            return None;
        }
        let mut tokens = tokens.skip_while(|t| *t != "lladdr");
        tokens.next()?;
        tokens.next()?.parse::<MacAddr>().ok()
    })
}

/// Parses `route -n get <dest>`. No `gateway:` line means on-link.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_route_get(output: &str, destination: IpAddr) -> Option<IpAddr> {
    let mut on_link: bool = false;
    for line in output.lines().map(str::trim) {
        if let Some(gateway) = line.strip_prefix("gateway:") {
            // strip a scope suffix such as fe80::1%en0
            let gateway: &str = gateway.trim().split('%').next().unwrap_or_default();
            if let Ok(ip) = gateway.parse::<IpAddr>() {
                return Some(ip);
            }
        }
        if line.starts_with("interface:") {
            on_link = true;
        }
    }
    on_link.then_some(destination)
}

/// Parses `arp -n <ip>` output: `? (192.168.1.1) at 0:11:22:33:44:55 on en0 ...`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_arp_lookup(output: &str) -> Option<MacAddr> {
    output.lines().find_map(|line| {
        let mut tokens = line.split_whitespace().skip_while(|t| *t != "at");
        tokens.next()?;
        tokens.next()?.parse::<MacAddr>().ok()
    })
}

/// Parses `ndp -n <ip>` output, skipping its header row.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_ndp(output: &str, address: Ipv6Addr) -> Option<MacAddr> {
    output.lines().skip(1).find_map(|line| {
        let mut tokens = line.split_whitespace();
        let neighbor: &str = tokens.next()?.split('%').next()?;
        if neighbor.parse::<Ipv6Addr>().ok()? != address {
            return None;
        }
        tokens.next()?.parse::<MacAddr>().ok()
    })
}

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::fs;
    use std::process::Command;

    pub fn next_hop(interface: &str, destination: IpAddr) -> Option<IpAddr> {
        match destination {
            IpAddr::V4(v4) => {
                let table: String = fs::read_to_string("/proc/net/route").ok()?;
                parse_ipv4_routes(&table, interface, v4).map(IpAddr::V4)
            }
            IpAddr::V6(v6) => {
                let table: String = fs::read_to_string("/proc/net/ipv6_route").ok()?;
                parse_ipv6_routes(&table, interface, v6).map(IpAddr::V6)
            }
        }
    }

    pub fn neighbor(interface: &str, address: IpAddr) -> Option<MacAddr> {
        match address {
            IpAddr::V4(v4) => {
                let table: String = fs::read_to_string("/proc/net/arp").ok()?;
                parse_arp_table(&table, interface, v4)
            }
            IpAddr::V6(v6) => {
                let output = Command::new("ip")
                    .args(["-6", "neigh", "show", "dev", interface])
                    .output()
                    .ok()?;
                parse_ip_neigh(&String::from_utf8_lossy(&output.stdout), v6)
            }
        }
    }
}

#[cfg(target_os = "macos")]
mod macos_impl {
    use super::*;
    use std::process::Command;

    pub fn next_hop(interface: &str, destination: IpAddr) -> Option<IpAddr> {
        let family: &str = if destination.is_ipv4() { "-inet" } else { "-inet6" };
        let output = Command::new("route")
            .args(["-n", "get", family, "-ifscope", interface, &destination.to_string()])
            .output()
            .ok()?;
        parse_route_get(&String::from_utf8_lossy(&output.stdout), destination)
    }

    pub fn neighbor(_interface: &str, address: IpAddr) -> Option<MacAddr> {
        match address {
            IpAddr::V4(v4) => {
                let output = Command::new("arp").args(["-n", &v4.to_string()]).output().ok()?;
                parse_arp_lookup(&String::from_utf8_lossy(&output.stdout))
            }
            IpAddr::V6(v6) => {
                let output = Command::new("ndp").args(["-n", &v6.to_string()]).output().ok()?;
                parse_ndp(&String::from_utf8_lossy(&output.stdout), v6)
            }
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod fallback_impl {
    use super::*;

    pub fn next_hop(_interface: &str, _destination: IpAddr) -> Option<IpAddr> {
        None
    }

    pub fn neighbor(_interface: &str, _address: IpAddr) -> Option<MacAddr> {
        None
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
