use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use tracing::debug;

use super::{Frame, FrameSink, TransmitError};

const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub type EthernetPair = (Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>);

/// Opens an Ethernet channel through `channel_opener`, which is
/// `datalink::channel` outside of tests.
pub fn open_eth_channel<F>(intf: &NetworkInterface, cfg: &Config, channel_opener: F) -> Result<EthernetPair, TransmitError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let ch: Channel = channel_opener(intf, *cfg).map_err(|source| TransmitError::Open {
        channel: format!("datalink channel on {}", intf.name),
        source,
    })?;
    match ch {
        Channel::Ethernet(tx, rx) => {
            debug!("Datalink channel on {} established", intf.name);
            Ok((tx, rx))
        }
        _ => Err(TransmitError::UnsupportedChannel(intf.name.clone())),
    }
}

/// Read timeout keeps a capture loop responsive to shutdown.
pub fn get_config() -> Config {
    Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    }
}

/// Link-layer transmitter. Owns the sending half of its own channel; the
/// receiving half is dropped since replies are watched by the capture side.
pub struct LinkTransmitter {
    interface: String,
    tx: Box<dyn DataLinkSender>,
}

impl LinkTransmitter {
    pub fn open(intf: &NetworkInterface) -> Result<Self, TransmitError> {
        Self::open_with(intf, datalink::channel)
    }

    pub fn open_with<F>(intf: &NetworkInterface, channel_opener: F) -> Result<Self, TransmitError>
    where
        F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
    {
        let (tx, _rx) = open_eth_channel(intf, &Config::default(), channel_opener)?;
        Ok(Self { interface: intf.name.clone(), tx })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameSink for LinkTransmitter {
    fn send(&mut self, frame: &Frame) -> Result<(), TransmitError> {
        let Frame::Link(bytes) = frame else {
            return Err(TransmitError::WrongFrame { sink: "link", frame: "network" });
        };
        match self.tx.send_to(bytes, None) {
            Some(result) => Ok(result?),
            None => Err(TransmitError::BufferFull),
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
    use pnet::datalink::dummy;
    use std::net::IpAddr;

    #[test]
    fn open_eth_channel_should_succeed_on_ethernet_channel() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(0);
        let result = open_eth_channel(&dummy_intf, &get_config(), |i, _| {
            dummy::channel(i, dummy::Config::default())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn open_eth_channel_should_fail_on_io_error() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(0);
        let result = open_eth_channel(&dummy_intf, &Config::default(), |_, _| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "Mock I/O Error"))
        });
        match result {
            Err(TransmitError::Open { channel, source }) => {
                assert_eq!(channel, "datalink channel on eth0");
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
                assert_eq!(source.to_string(), "Mock I/O Error");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("Test failed: expected Err, got Ok"),
        }
    }

    #[test]
    fn link_transmitter_writes_frame_bytes() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(1);
        let mut cfg = dummy::Config::default();
        let written = cfg.read_handle().unwrap();

        let mut tx = LinkTransmitter::open_with(&dummy_intf, move |i, _| dummy::channel(i, cfg)).unwrap();
        assert_eq!(tx.interface(), "eth1");

        let frame: Vec<u8> = (0u8..60).collect();
        tx.send(&Frame::Link(frame.clone())).unwrap();
        assert_eq!(&*written.recv().unwrap(), frame.as_slice());
    }

    #[test]
    fn link_transmitter_refuses_network_frames() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(0);
        let mut tx = LinkTransmitter::open_with(&dummy_intf, |i, _| dummy::channel(i, dummy::Config::default())).unwrap();
        let destination: IpAddr = "10.0.0.2".parse().unwrap();
        let frame = Frame::Network {
            destination,
            protocol: pnet::packet::ip::IpNextHeaderProtocols::Tcp,
            bytes: vec![0; 40],
        };
        assert!(matches!(tx.send(&frame), Err(TransmitError::WrongFrame { sink: "link", .. })));
    }
}
