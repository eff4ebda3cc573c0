use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use pnet::datalink::NetworkInterface;
use pnet::ipnetwork::IpNetwork;
use pnet::util::MacAddr;

use bidi_common::config::{Config, ProbeKind, TransmitMode};
use bidi_common::network::route::RouteTable;
use bidi_core::network::{Frame, FrameSink, TransmitError};
use bidi_core::probe::{ProbeSession, build_prober};

pub const IFF_UP: u32 = 1;
pub const IFF_BROADCAST: u32 = 1 << 1;

pub fn interface_mac() -> MacAddr {
    MacAddr(0x02, 0x42, 0xac, 0x11, 0x00, 0x02)
}

pub fn gateway_mac() -> MacAddr {
    MacAddr(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff)
}

/// One Ethernet interface with a dual-stack default route.
pub struct LanTable {
    pub neighbors: HashMap<IpAddr, MacAddr>,
}

impl LanTable {
    pub fn new() -> Self {
        let mut neighbors = HashMap::new();
        neighbors.insert("192.168.1.1".parse().unwrap(), gateway_mac());
        neighbors.insert("fe80::1".parse().unwrap(), gateway_mac());
        Self { neighbors }
    }

    pub fn without_neighbors() -> Self {
        Self { neighbors: HashMap::new() }
    }
}

impl RouteTable for LanTable {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        vec![NetworkInterface {
            name: "eth0".to_string(),
            description: String::new(),
            index: 2,
            mac: Some(interface_mac()),
            ips: vec![
                IpNetwork::V4("192.168.1.50/24".parse().unwrap()),
                IpNetwork::V6("fe80::50/64".parse().unwrap()),
                IpNetwork::V6("2001:db8::50/64".parse().unwrap()),
            ],
            flags: IFF_UP | IFF_BROADCAST,
        }]
    }

    fn preferred_source(&self, destination: IpAddr) -> Option<IpAddr> {
        match destination {
            IpAddr::V4(_) => "192.168.1.50".parse().ok(),
            IpAddr::V6(_) => "2001:db8::50".parse().ok(),
        }
    }

    fn next_hop(&self, _interface: &str, destination: IpAddr) -> Option<IpAddr> {
        match destination {
            IpAddr::V4(_) => "192.168.1.1".parse().ok(),
            IpAddr::V6(_) => "fe80::1".parse().ok(),
        }
    }

    fn neighbor(&self, _interface: &str, address: IpAddr) -> Option<MacAddr> {
        self.neighbors.get(&address).copied()
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<Vec<Frame>>>);

impl RecordingSink {
    pub fn frames(&self) -> Vec<Frame> {
        self.0.lock().unwrap().clone()
    }
}

impl FrameSink for RecordingSink {
    fn send(&mut self, frame: &Frame) -> Result<(), TransmitError> {
        self.0.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

pub fn config(probe: ProbeKind, mode: TransmitMode) -> Config {
    Config {
        probe,
        transmit_mode: mode,
        probe_delay: std::time::Duration::ZERO,
        ..Config::default()
    }
}

pub fn session(worker: usize, config: &Config, table: LanTable, sink: &RecordingSink) -> ProbeSession {
    ProbeSession::new(
        worker,
        build_prober(config),
        Arc::new(table),
        Some(Box::new(sink.clone())),
        config.seed,
    )
}
