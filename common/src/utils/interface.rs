use std::net::{Ipv4Addr, Ipv6Addr};

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;

/// Convenience accessors used when listing interfaces and picking defaults.
pub trait NetworkInterfaceExtension {
    fn ipv4_addrs(&self) -> Vec<Ipv4Addr>;
    fn ipv6_addrs(&self) -> Vec<Ipv6Addr>;
    /// Up, has an address, and carries Ethernet framing (or is loopback).
    fn can_send_probes(&self) -> bool;
    /// One-line description: `eth0 aa:bb:.. 192.168.1.5/24 fe80::1/64`.
    fn summary(&self) -> String;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn ipv4_addrs(&self) -> Vec<Ipv4Addr> {
        self.ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V4(v4) => Some(v4.ip()),
                IpNetwork::V6(_) => None,
            })
            .collect()
    }

    fn ipv6_addrs(&self) -> Vec<Ipv6Addr> {
        self.ips
            .iter()
            .filter_map(|ip| match ip {
                IpNetwork::V6(v6) => Some(v6.ip()),
                IpNetwork::V4(_) => None,
            })
            .collect()
    }

    fn can_send_probes(&self) -> bool {
        self.is_up() && !self.ips.is_empty() && (self.is_loopback() || self.mac.is_some())
    }

    fn summary(&self) -> String {
        let mac: String = self
            .mac
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string());
        let nets: Vec<String> = self.ips.iter().map(|n| n.to_string()).collect();
        format!("{} {} {}", self.name, mac, nets.join(" "))
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
    use pnet::util::MacAddr;

    const IFF_UP: u32 = 1;
    const IFF_BROADCAST: u32 = 1 << 1;

    fn eth0(flags: u32, mac: Option<MacAddr>) -> NetworkInterface {
        NetworkInterface {
            name: "eth0".to_string(),
            description: String::new(),
            index: 2,
            mac,
            ips: vec![
                IpNetwork::V4("192.168.1.5/24".parse().unwrap()),
                IpNetwork::V6("fe80::1/64".parse().unwrap()),
            ],
            flags,
        }
    }

    #[test]
    fn splits_addresses_by_family() {
        let iface = eth0(IFF_UP, None);
        assert_eq!(iface.ipv4_addrs(), vec![Ipv4Addr::new(192, 168, 1, 5)]);
        assert_eq!(iface.ipv6_addrs(), vec!["fe80::1".parse::<Ipv6Addr>().unwrap()]);
    }

    #[test]
    fn probe_capability_needs_up_and_mac() {
        let mac = Some(MacAddr(1, 2, 3, 4, 5, 6));
        assert!(eth0(IFF_UP | IFF_BROADCAST, mac).can_send_probes());
        assert!(!eth0(IFF_BROADCAST, mac).can_send_probes());
        assert!(!eth0(IFF_UP, None).can_send_probes());
    }

    #[test]
    fn summary_lists_mac_and_networks() {
        let iface = eth0(IFF_UP, Some(MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)));
        assert_eq!(iface.summary(), "eth0 aa:bb:cc:dd:ee:ff 192.168.1.5/24 fe80::1/64");
    }
}
