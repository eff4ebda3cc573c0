use std::net::IpAddr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet};
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::{self, TcpFlags, TcpPacket};
use pnet::packet::udp::UdpPacket;

use bidi_common::config::{Config, ProbeKind, TransmitMode};
use bidi_common::network::target::Target;
use bidi_core::error::ProbeStep;
use bidi_core::network::Frame;
use bidi_core::probe::{ProbeOutcome, ProbeStatus};
use bidi_protocols::quic::{self, protect};

use super::common::{LanTable, RecordingSink, config, gateway_mac, interface_mac, session};

fn remote_v4() -> Target {
    Target::new("93.184.216.34".parse().unwrap(), "example.com")
}

fn remote_v6() -> Target {
    Target::new("2001:db8:ffff::34".parse().unwrap(), "example.com")
}

fn link_bytes(frame: &Frame) -> &[u8] {
    match frame {
        Frame::Link(bytes) => bytes,
        Frame::Network { .. } => panic!("expected a link frame"),
    }
}

#[test]
fn tls_over_link_forms_a_valid_spoofed_handshake() {
    let config = Config { send_syn_ack: true, seed: 1234, ..config(ProbeKind::Tls, TransmitMode::Link) };
    let sink = RecordingSink::default();
    let status = session(0, &config, LanTable::new(), &sink).run(&remote_v4()).unwrap();
    assert_eq!(status, ProbeStatus::Sent { frames: 3 });

    let frames = sink.frames();
    let mut segments: Vec<(u32, u32, u8, usize)> = Vec::new();
    for frame in &frames {
        let eth = EthernetPacket::new(link_bytes(frame)).unwrap();
        assert_eq!(eth.get_source(), interface_mac());
        assert_eq!(eth.get_destination(), gateway_mac());
        assert_eq!(eth.get_ethertype(), EtherTypes::Ipv4);

        let ip = Ipv4Packet::new(eth.payload()).unwrap();
        assert_eq!(ip.get_source().to_string(), "192.168.1.50");
        assert_eq!(ip.get_destination().to_string(), "93.184.216.34");
        assert_eq!(ip.get_checksum(), ipv4::checksum(&ip));

        let segment = TcpPacket::new(ip.payload()).unwrap();
        assert_eq!(segment.get_destination(), 443);
        assert_eq!(segment.get_window(), 502);
        assert_eq!(segment.get_checksum(), tcp::ipv4_checksum(&segment, &ip.get_source(), &ip.get_destination()));
        segments.push((
            segment.get_sequence(),
            segment.get_acknowledgement(),
            segment.get_flags() as u8,
            segment.payload().len(),
        ));
    }

    let (syn, ack, data) = (segments[0], segments[1], segments[2]);
    assert_eq!(syn.2, TcpFlags::SYN as u8);
    assert_eq!(ack.2, TcpFlags::ACK as u8);
    assert_eq!(data.2, (TcpFlags::PSH | TcpFlags::ACK) as u8);
    assert_eq!(data.0, syn.0.wrapping_add(1));
    assert_eq!(data.1, ack.1);
    assert_eq!(syn.3, 0);
    assert!(data.3 > 0);
}

#[test]
fn raw_ipv4_leaves_header_checksum_to_the_kernel() {
    let config = config(ProbeKind::Http, TransmitMode::Raw);
    let sink = RecordingSink::default();
    session(0, &config, LanTable::without_neighbors(), &sink).run(&remote_v4()).unwrap();

    let frames = sink.frames();
    let Frame::Network { destination, protocol, bytes } = &frames[0] else { panic!("expected network frame") };
    assert_eq!(*destination, "93.184.216.34".parse::<IpAddr>().unwrap());
    assert_eq!(*protocol, IpNextHeaderProtocols::Tcp);

    let ip = Ipv4Packet::new(bytes).unwrap();
    assert_eq!(ip.get_checksum(), 0);
    assert_eq!(ip.get_total_length() as usize, bytes.len());
    let segment = TcpPacket::new(ip.payload()).unwrap();
    assert!(segment.payload().starts_with(b"GET / HTTP/1.1\r\nHost: example.com\r\n"));
}

#[test]
fn raw_ipv6_hands_the_kernel_a_checksummed_segment() {
    let config = config(ProbeKind::Http, TransmitMode::Raw);
    let sink = RecordingSink::default();
    session(0, &config, LanTable::without_neighbors(), &sink).run(&remote_v6()).unwrap();

    let frames = sink.frames();
    let Frame::Network { bytes, .. } = &frames[0] else { panic!("expected network frame") };
    let segment = TcpPacket::new(bytes).unwrap();
    assert_eq!(segment.get_destination(), 80);
    let (src, dst) = ("2001:db8::50".parse().unwrap(), "2001:db8:ffff::34".parse().unwrap());
    assert_eq!(segment.get_checksum(), tcp::ipv6_checksum(&segment, &src, &dst));
}

#[test]
fn raw_ipv6_checksum_covers_the_hinted_kernel_source() {
    let config = config(ProbeKind::Http, TransmitMode::Raw);
    let sink = RecordingSink::default();
    let target = remote_v6().with_hint(Some("2001:db8::50".parse().unwrap()));
    session(0, &config, LanTable::without_neighbors(), &sink).run(&target).unwrap();

    let frames = sink.frames();
    let Frame::Network { bytes, .. } = &frames[0] else { panic!("expected network frame") };
    let segment = TcpPacket::new(bytes).unwrap();
    let (src, dst) = ("2001:db8::50".parse().unwrap(), "2001:db8:ffff::34".parse().unwrap());
    assert_eq!(segment.get_checksum(), tcp::ipv6_checksum(&segment, &src, &dst));
}

#[test]
fn raw_ipv6_refuses_a_hint_the_kernel_would_replace() {
    let config = config(ProbeKind::Quic, TransmitMode::Raw);
    let sink = RecordingSink::default();
    let target = remote_v6().with_hint(Some("fe80::50".parse().unwrap()));
    let result = session(0, &config, LanTable::without_neighbors(), &sink).run(&target);

    let outcome = ProbeOutcome { worker: 0, target, result };
    assert_eq!(outcome.result.as_ref().unwrap_err().step(), ProbeStep::Route);
    assert!(outcome.to_string().contains("error route: raw ipv6 sockets send from the kernel's chosen source"));
    assert!(sink.frames().is_empty());
}

#[test]
fn link_ipv6_keeps_a_non_preferred_hint() {
    let config = config(ProbeKind::Http, TransmitMode::Link);
    let sink = RecordingSink::default();
    let target = remote_v6().with_hint(Some("fe80::50".parse().unwrap()));
    session(0, &config, LanTable::new(), &sink).run(&target).unwrap();

    let frames = sink.frames();
    let eth = EthernetPacket::new(link_bytes(&frames[0])).unwrap();
    let ip = Ipv6Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_source().to_string(), "fe80::50");
    let segment = TcpPacket::new(ip.payload()).unwrap();
    assert_eq!(segment.get_checksum(), tcp::ipv6_checksum(&segment, &ip.get_source(), &ip.get_destination()));
}

#[test]
fn quic_initial_over_ipv6_link_opens_with_derived_keys() {
    let config = config(ProbeKind::Quic, TransmitMode::Link);
    let sink = RecordingSink::default();
    session(0, &config, LanTable::new(), &sink).run(&remote_v6()).unwrap();

    let frames = sink.frames();
    let eth = EthernetPacket::new(link_bytes(&frames[0])).unwrap();
    assert_eq!(eth.get_ethertype(), EtherTypes::Ipv6);
    let ip = Ipv6Packet::new(eth.payload()).unwrap();
    assert_eq!(ip.get_next_header(), IpNextHeaderProtocols::Udp);
    let datagram = UdpPacket::new(ip.payload()).unwrap();
    assert_eq!(datagram.get_destination(), 443);

    let mut packet: Vec<u8> = datagram.payload().to_vec();
    assert_eq!(packet.len(), 1200);
    let dcid_len = packet[5] as usize;
    let dcid: Vec<u8> = packet[6..6 + dcid_len].to_vec();
    let scid_len = packet[6 + dcid_len] as usize;
    // token length (1) + two-byte length field
    let pn_offset = 6 + dcid_len + 1 + scid_len + 1 + 2;

    let keys = quic::derive_keys(&dcid).unwrap();
    let pn_len = protect::remove_header_protection(&mut packet, pn_offset, &keys.hp).unwrap();
    let header_len = pn_offset + pn_len;
    let (header, rest) = packet.split_at(header_len);
    let (ciphertext, tag) = rest.split_at(rest.len() - protect::TAG_LEN);
    let plaintext = protect::decrypt(header, ciphertext, tag.try_into().unwrap(), &keys.iv, &keys.key, 0).unwrap();
    assert_eq!(plaintext.len(), ciphertext.len());
    assert!(plaintext.windows(11).any(|w| w == b"example.com"));
}

#[test]
fn wrong_family_hint_is_ignored() {
    let config = config(ProbeKind::Http, TransmitMode::Raw);
    let sink = RecordingSink::default();
    let target = remote_v4().with_hint(Some("2001:db8::50".parse().unwrap()));
    session(0, &config, LanTable::new(), &sink).run(&target).unwrap();

    let frames = sink.frames();
    let Frame::Network { bytes, .. } = &frames[0] else { panic!("expected network frame") };
    let ip = Ipv4Packet::new(bytes).unwrap();
    assert_eq!(ip.get_source().to_string(), "192.168.1.50");
}

#[test]
fn missing_neighbor_is_a_route_error_and_sends_nothing() {
    let config = config(ProbeKind::Tls, TransmitMode::Link);
    let sink = RecordingSink::default();
    let target = remote_v4();
    let result = session(0, &config, LanTable::without_neighbors(), &sink).run(&target);

    let outcome = ProbeOutcome { worker: 0, target, result };
    assert_eq!(outcome.result.as_ref().unwrap_err().step(), ProbeStep::Route);
    assert!(outcome.to_string().starts_with("RESULT 93.184.216.34 example.com error route: no hardware address"));
    assert!(sink.frames().is_empty());
}

#[test]
fn seeds_reproduce_and_workers_diverge() {
    let config = Config { seed: 77, send_syn_ack: true, ..config(ProbeKind::Http, TransmitMode::Link) };
    let run = |worker: usize| {
        let sink = RecordingSink::default();
        session(worker, &config, LanTable::new(), &sink).run(&remote_v4()).unwrap();
        sink.frames()
    };

    assert_eq!(run(0), run(0));
    assert_ne!(run(0), run(1));
}
