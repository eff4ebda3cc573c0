use std::collections::HashMap;
use std::net::IpAddr;

use pnet::packet::Packet;
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::transport::{self, TransportChannelType, TransportProtocol, TransportSender};
use tracing::debug;

use super::{Frame, FrameSink, TransmitError};

const TRANSPORT_BUFFER_SIZE: usize = 4096;

/// Raw byte view handed to pnet, which only needs `Packet::packet`.
struct RawBytes<'a>(&'a [u8]);

impl Packet for RawBytes<'_> {
    fn packet(&self) -> &[u8] {
        self.0
    }

    fn payload(&self) -> &[u8] {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChannelKey {
    ipv4: bool,
    protocol: IpNextHeaderProtocol,
}

/// IPv4 goes through a `Layer3` channel (we write the IP header, the kernel
/// fills its checksum). IPv6 raw sockets cannot include the header, so those
/// use `Layer4` and the kernel writes the IPv6 header.
fn channel_type(key: ChannelKey) -> TransportChannelType {
    if key.ipv4 {
        TransportChannelType::Layer3(key.protocol)
    } else {
        TransportChannelType::Layer4(TransportProtocol::Ipv6(key.protocol))
    }
}

fn open_channel(key: ChannelKey) -> Result<TransportSender, TransmitError> {
    let (tx, _rx) = transport::transport_channel(TRANSPORT_BUFFER_SIZE, channel_type(key)).map_err(|source| {
        TransmitError::Open {
            channel: format!("raw {} socket for protocol {}", if key.ipv4 { "ipv4" } else { "ipv6" }, key.protocol.0),
            source,
        }
    })?;
    Ok(tx)
}

/// Network-layer transmitter over raw sockets. Sockets are opened on first
/// use per address family and protocol and kept for the life of the worker.
#[derive(Default)]
pub struct RawTransmitter {
    senders: HashMap<ChannelKey, TransportSender>,
}

impl RawTransmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&mut self, key: ChannelKey) -> Result<&mut TransportSender, TransmitError> {
        if !self.senders.contains_key(&key) {
            let tx: TransportSender = open_channel(key)?;
            debug!("Opened raw socket (ipv4: {}, protocol {})", key.ipv4, key.protocol.0);
            self.senders.insert(key, tx);
        }
        self.senders.get_mut(&key).ok_or(TransmitError::NoSink)
    }
}

impl FrameSink for RawTransmitter {
    fn send(&mut self, frame: &Frame) -> Result<(), TransmitError> {
        let Frame::Network { destination, protocol, bytes } = frame else {
            return Err(TransmitError::WrongFrame { sink: "raw", frame: "link" });
        };
        let key = ChannelKey { ipv4: destination.is_ipv4(), protocol: *protocol };
        let destination: IpAddr = *destination;

        let written: usize = self.sender(key)?.send_to(RawBytes(bytes), destination)?;
        if written != bytes.len() {
            return Err(TransmitError::ShortWrite { written, expected: bytes.len() });
        }
        Ok(())
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
    use bidi_common::config::TransmitMode;
    use bidi_protocols::codec::{HeaderStack, NetworkLayer, TransportLayer};
    use bidi_protocols::udp::UdpLayer;
    use pnet::packet::ip::IpNextHeaderProtocols;

    #[test]
    fn ipv4_uses_layer3_and_ipv6_layer4() {
        let v4 = channel_type(ChannelKey { ipv4: true, protocol: IpNextHeaderProtocols::Tcp });
        assert!(matches!(v4, TransportChannelType::Layer3(p) if p == IpNextHeaderProtocols::Tcp));

        let v6 = channel_type(ChannelKey { ipv4: false, protocol: IpNextHeaderProtocols::Udp });
        assert!(matches!(
            v6,
            TransportChannelType::Layer4(TransportProtocol::Ipv6(p)) if p == IpNextHeaderProtocols::Udp
        ));
    }

    #[test]
    fn link_frames_are_refused() {
        let mut tx = RawTransmitter::new();
        let err = tx.send(&Frame::Link(vec![0; 60])).unwrap_err();
        assert!(matches!(err, TransmitError::WrongFrame { sink: "raw", .. }));
        assert!(tx.senders.is_empty());
    }

    #[test]
    #[ignore]
    fn sends_udp_to_loopback_with_root() {
        let stack = HeaderStack {
            link: None,
            network: NetworkLayer::new("127.0.0.1".parse().unwrap(), "127.0.0.1".parse().unwrap()),
            transport: TransportLayer::Udp(UdpLayer { source_port: 40000, destination_port: 9 }),
            payload: b"bidi".to_vec(),
        };
        let frame = crate::network::encode_frame(&stack, TransmitMode::Raw).unwrap();
        let mut tx = RawTransmitter::new();
        tx.send(&frame).unwrap();
    }
}
