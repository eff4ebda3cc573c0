use rand::Rng;
use tracing::debug;

use bidi_common::config::{Config, ProbeKind, TransmitMode};
use bidi_common::network::target::Target;
use bidi_protocols::codec::{FrameSummary, HeaderStack, NetworkLayer, TransportKind, TransportLayer};
use bidi_protocols::quic::packet::MIN_INITIAL_DATAGRAM;
use bidi_protocols::quic::{self, InitialPacket, KeyMaterial, QUIC_PORT};
use bidi_protocols::tls::{ClientHello, HelloProfile};
use bidi_protocols::udp::UdpLayer;

use super::{Observation, ProbeContext, ProbeOption, ProbeStatus, Prober, require_domain};
use crate::error::ProbeError;
use crate::network::tcp::random_source_port_except;
use crate::network::{Frame, encode_frame, resolve_addressing};

pub const ALPN_H3: &[u8] = b"h3";
const CID_LEN: usize = 8;

/// A protected QUIC v1 client Initial carrying a ClientHello for the target
/// domain.
pub struct QuicProber {
    port: u16,
    interface: String,
    mode: TransmitMode,
}

impl QuicProber {
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.dst_port.unwrap_or(QUIC_PORT),
            interface: config.interface.clone(),
            mode: config.transmit_mode,
        }
    }
}

/// Builds the protected datagram payload. Keys are derived before anything
/// else is assembled and dropped as soon as the packet is sealed.
pub fn initial_datagram<R: Rng + ?Sized>(server_name: &str, rng: &mut R) -> Result<Vec<u8>, ProbeError> {
    let dcid: [u8; CID_LEN] = rng.random();
    let scid: [u8; CID_LEN] = rng.random();
    let keys: KeyMaterial = quic::derive_keys(&dcid)?;

    let hello = ClientHello {
        server_name: server_name.to_string(),
        random: rng.random(),
        session_id: Vec::new(),
        key_share: rng.random(),
        profile: HelloProfile::Quic {
            alpn: ALPN_H3.to_vec(),
            transport_parameters: quic::client_transport_parameters(&scid)?,
        },
    };

    let mut packet = InitialPacket {
        dcid: dcid.to_vec(),
        scid: scid.to_vec(),
        token: Vec::new(),
        packet_number: 0,
        payload: quic::crypto_frame(0, &hello.encode()?)?,
    };
    packet.pad_to(MIN_INITIAL_DATAGRAM)?;
    Ok(packet.protect(&keys)?)
}

/// Header form of a server's first byte, e.g. `long/initial 0xc3`.
pub fn describe_first_byte(payload: &[u8]) -> String {
    let Some(&first) = payload.first() else {
        return "empty".to_string();
    };
    if first & 0x80 == 0 {
        return format!("short 0x{first:02x}");
    }
    if payload.get(1..5) == Some(&[0, 0, 0, 0][..]) {
        return format!("long/version-negotiation 0x{first:02x}");
    }
    let kind: &str = match (first >> 4) & 0x03 {
        0 => "initial",
        1 => "0rtt",
        2 => "handshake",
        _ => "retry",
    };
    format!("long/{kind} 0x{first:02x}")
}

impl Prober for QuicProber {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Quic
    }

    fn options(&self) -> Vec<ProbeOption> {
        vec![
            ProbeOption::new("port", self.port),
            ProbeOption::new("interface", &self.interface),
            ProbeOption::new("mode", self.mode),
            ProbeOption::new("alpn", String::from_utf8_lossy(ALPN_H3)),
        ]
    }

    fn should_read(&self) -> bool {
        false
    }

    fn send_probe(&self, target: &Target, ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError> {
        let datagram: Vec<u8> = initial_datagram(require_domain(target)?, ctx.rng)?;
        let addressing = resolve_addressing(
            ctx.routes,
            &self.interface,
            target.local_hint,
            target.destination,
            self.mode,
        )?;

        let stack = HeaderStack {
            link: addressing.link,
            network: NetworkLayer::new(addressing.source, addressing.destination),
            transport: TransportLayer::Udp(UdpLayer {
                source_port: random_source_port_except(ctx.rng, self.port),
                destination_port: self.port,
            }),
            payload: datagram,
        };
        let frame: Frame = encode_frame(&stack, self.mode)?;
        ctx.sink()?.send(&frame)?;
        debug!(
            "Sent QUIC Initial to {} ({} bytes): {}",
            target.destination,
            frame.bytes().len(),
            hex::encode(frame.bytes())
        );
        Ok(ProbeStatus::Sent { frames: 1 })
    }

    fn observe(&self, frame: &FrameSummary) -> Option<Observation> {
        // Outbound Initials (ours included) are addressed to the service port.
        if frame.transport != TransportKind::Udp
            || frame.source_port != Some(self.port)
            || frame.destination_port == Some(self.port)
        {
            return None;
        }
        Some(Observation {
            protocol: "QUIC",
            source: frame.source,
            detail: describe_first_byte(&frame.payload),
        })
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
    use crate::probe::tests::{RecordingSink, loopback_config, session};
    use bidi_protocols::codec::{LinkType, decode_frame};
    use bidi_protocols::quic::protect;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Header length of an Initial with 8-byte CIDs, no token, 2-byte
    /// length and 1-byte packet number.
    const HEADER_LEN: usize = 1 + 4 + 1 + CID_LEN + 1 + CID_LEN + 1 + 2 + 1;

    #[test]
    fn datagram_is_padded_to_minimum() {
        let datagram = initial_datagram("example.com", &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(datagram.len(), MIN_INITIAL_DATAGRAM);
        assert_eq!(datagram[0] & 0xf0, 0xc0);
        assert_eq!(&datagram[1..5], &[0, 0, 0, 1]);
        assert_eq!(datagram[5] as usize, CID_LEN);
    }

    #[test]
    fn server_side_can_open_the_initial() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut datagram = initial_datagram("example.com", &mut rng).unwrap();
        let dcid: Vec<u8> = datagram[6..6 + CID_LEN].to_vec();
        let keys = quic::derive_keys(&dcid).unwrap();

        let pn_offset = HEADER_LEN - 1;
        let pn_len = protect::remove_header_protection(&mut datagram, pn_offset, &keys.hp).unwrap();
        assert_eq!(pn_len, 1);
        assert_eq!(datagram[pn_offset], 0);

        let (header, rest) = datagram.split_at(HEADER_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - protect::TAG_LEN);
        let tag: [u8; 16] = tag.try_into().unwrap();
        let plaintext = protect::decrypt(header, ciphertext, &tag, &keys.iv, &keys.key, 0).unwrap();

        assert_eq!(plaintext[0], 0x06, "CRYPTO frame first");
        let sni = b"example.com";
        assert!(plaintext.windows(sni.len()).any(|w| w == sni));
        assert!(plaintext.windows(2).any(|w| w == ALPN_H3));
    }

    #[test]
    fn probe_sends_one_udp_datagram() {
        let config = loopback_config(ProbeKind::Quic);
        let sink = RecordingSink::default();
        let status = session(&config, &sink)
            .run(&Target::new("127.0.0.1".parse().unwrap(), "example.com"))
            .unwrap();
        assert_eq!(status, ProbeStatus::Sent { frames: 1 });

        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        let summary = decode_frame(frames[0].bytes(), LinkType::Ethernet).unwrap();
        assert_eq!(summary.transport, TransportKind::Udp);
        assert_eq!(summary.destination_port, Some(443));
        assert_eq!(summary.payload.len(), MIN_INITIAL_DATAGRAM);
    }

    #[test]
    fn own_initial_on_the_service_port_is_not_a_reply() {
        let config = Config { dst_port: Some(4433), ..loopback_config(ProbeKind::Quic) };
        let prober = QuicProber::from_config(&config);
        let mut frame = FrameSummary {
            source: "10.0.0.1".parse().unwrap(),
            destination: "203.0.113.9".parse().unwrap(),
            transport: TransportKind::Udp,
            source_port: Some(4433),
            destination_port: Some(4433),
            payload: vec![0xc3, 0, 0, 0, 1],
            tcp_flags: None,
        };
        assert!(prober.observe(&frame).is_none());

        frame.destination_port = Some(51000);
        let obs = prober.observe(&frame).unwrap();
        assert_eq!(obs.detail, "long/initial 0xc3");
    }

    #[test]
    fn first_byte_forms() {
        assert_eq!(describe_first_byte(&[]), "empty");
        assert_eq!(describe_first_byte(&[0x40, 1, 2]), "short 0x40");
        assert_eq!(describe_first_byte(&[0xc3, 0, 0, 0, 1]), "long/initial 0xc3");
        assert_eq!(describe_first_byte(&[0xe0, 0, 0, 0, 1]), "long/handshake 0xe0");
        assert_eq!(describe_first_byte(&[0xf0, 0, 0, 0, 1]), "long/retry 0xf0");
        assert_eq!(describe_first_byte(&[0x80, 0, 0, 0, 0]), "long/version-negotiation 0x80");
    }
}
