//! # TLS 1.3 ClientHello
//!
//! Two fixed ClientHello shapes, differing only in the fields the probes need
//! to vary:
//! * [`HelloProfile::Tcp`] mirrors a browser-like hello sent over TCP/443,
//!   wrapped in a TLS record by [`record`].
//! * [`HelloProfile::Quic`] is the hello carried in a QUIC Initial CRYPTO
//!   frame, with ALPN and QUIC transport parameters.
//!
//! Every length field is derived from the server name, so any name that fits
//! the 16-bit length fields produces a well-formed message.

use thiserror::Error;

pub const TLS_PORT: u16 = 443;

const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const LEGACY_RECORD_VERSION: [u8; 2] = [0x03, 0x01];
const LEGACY_VERSION: [u8; 2] = [0x03, 0x03];
const NULL_COMPRESSION: [u8; 2] = [0x01, 0x00];
const X25519: [u8; 2] = [0x00, 0x1d];

const EXT_SERVER_NAME: u16 = 0x0000;
const EXT_EC_POINT_FORMATS: u16 = 0x000b;
const EXT_SUPPORTED_GROUPS: u16 = 0x000a;
const EXT_ALPN: u16 = 0x0010;
const EXT_SIGNATURE_ALGORITHMS: u16 = 0x000d;
const EXT_ENCRYPT_THEN_MAC: u16 = 0x0016;
const EXT_EXTENDED_MASTER_SECRET: u16 = 0x0017;
const EXT_SESSION_TICKET: u16 = 0x0023;
const EXT_SUPPORTED_VERSIONS: u16 = 0x002b;
const EXT_PSK_KEY_EXCHANGE_MODES: u16 = 0x002d;
const EXT_KEY_SHARE: u16 = 0x0033;
const EXT_QUIC_TRANSPORT_PARAMETERS: u16 = 0x0039;

const TCP_CIPHER_SUITES: [u8; 8] = [0x13, 0x02, 0x13, 0x03, 0x13, 0x01, 0x00, 0xff];
const TCP_EC_POINT_FORMATS: [u8; 4] = [0x03, 0x00, 0x01, 0x02];
const TCP_GROUPS: [u8; 22] = [
    0x00, 0x14, 0x00, 0x1d, 0x00, 0x17, 0x00, 0x1e, 0x00, 0x19, 0x00, 0x18, 0x01, 0x00, 0x01, 0x01,
    0x01, 0x02, 0x01, 0x03, 0x01, 0x04,
];
const TCP_SIGNATURE_ALGORITHMS: [u8; 30] = [
    0x00, 0x1c, 0x04, 0x03, 0x05, 0x03, 0x06, 0x03, 0x08, 0x07, 0x08, 0x08, 0x08, 0x09, 0x08, 0x0a,
    0x08, 0x0b, 0x08, 0x04, 0x08, 0x05, 0x08, 0x06, 0x04, 0x01, 0x05, 0x01, 0x06, 0x01,
];

const QUIC_CIPHER_SUITES: [u8; 6] = [0x13, 0x01, 0x13, 0x02, 0x13, 0x03];
const QUIC_GROUPS: [u8; 8] = [0x00, 0x06, 0x00, 0x1d, 0x00, 0x17, 0x00, 0x18];
const QUIC_SIGNATURE_ALGORITHMS: [u8; 20] = [
    0x00, 0x12, 0x04, 0x03, 0x08, 0x04, 0x04, 0x01, 0x05, 0x03, 0x08, 0x05, 0x05, 0x01, 0x08, 0x06,
    0x06, 0x01, 0x02, 0x01,
];

const TLS13_ONLY: [u8; 3] = [0x02, 0x03, 0x04];
const PSK_DHE_KE: [u8; 2] = [0x01, 0x01];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlsError {
    #[error("server name is empty")]
    EmptyServerName,
    #[error("{field} length {length} does not fit its length field")]
    TooLong { field: &'static str, length: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloProfile {
    Tcp,
    Quic {
        alpn: Vec<u8>,
        transport_parameters: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub server_name: String,
    pub random: [u8; 32],
    /// Legacy session id. The QUIC profile always sends an empty one.
    pub session_id: Vec<u8>,
    /// X25519 public key share.
    pub key_share: [u8; 32],
    pub profile: HelloProfile,
}

impl ClientHello {
    /// Encodes the handshake message (type, 24-bit length, body).
    pub fn encode(&self) -> Result<Vec<u8>, TlsError> {
        if self.server_name.is_empty() {
            return Err(TlsError::EmptyServerName);
        }

        let (session_id, suites): (&[u8], &[u8]) = match self.profile {
            HelloProfile::Tcp => (self.session_id.as_slice(), &TCP_CIPHER_SUITES[..]),
            HelloProfile::Quic { .. } => (&[][..], &QUIC_CIPHER_SUITES[..]),
        };

        let mut body: Vec<u8> = Vec::with_capacity(256);
        body.extend_from_slice(&LEGACY_VERSION);
        body.extend_from_slice(&self.random);
        put_u8_prefixed(&mut body, session_id, "session id")?;
        put_u16_prefixed(&mut body, suites, "cipher suites")?;
        body.extend_from_slice(&NULL_COMPRESSION);
        put_u16_prefixed(&mut body, &self.extensions()?, "extensions")?;

        let length: u32 = u32::try_from(body.len())
            .ok()
            .filter(|l| *l < (1 << 24))
            .ok_or(TlsError::TooLong {
                field: "handshake",
                length: body.len(),
            })?;

        let mut message: Vec<u8> = Vec::with_capacity(body.len() + 4);
        message.push(HANDSHAKE_CLIENT_HELLO);
        message.extend_from_slice(&length.to_be_bytes()[1..]);
        message.extend_from_slice(&body);
        Ok(message)
    }

    fn extensions(&self) -> Result<Vec<u8>, TlsError> {
        let mut out: Vec<u8> = Vec::with_capacity(192);
        put_extension(&mut out, EXT_SERVER_NAME, &server_name_list(&self.server_name)?)?;

        let key_share: Vec<u8> = key_share_list(&self.key_share);
        match &self.profile {
            HelloProfile::Tcp => {
                put_extension(&mut out, EXT_EC_POINT_FORMATS, &TCP_EC_POINT_FORMATS)?;
                put_extension(&mut out, EXT_SUPPORTED_GROUPS, &TCP_GROUPS)?;
                put_extension(&mut out, EXT_SESSION_TICKET, &[])?;
                put_extension(&mut out, EXT_ENCRYPT_THEN_MAC, &[])?;
                put_extension(&mut out, EXT_EXTENDED_MASTER_SECRET, &[])?;
                put_extension(&mut out, EXT_SIGNATURE_ALGORITHMS, &TCP_SIGNATURE_ALGORITHMS)?;
                put_extension(&mut out, EXT_SUPPORTED_VERSIONS, &TLS13_ONLY)?;
                put_extension(&mut out, EXT_PSK_KEY_EXCHANGE_MODES, &PSK_DHE_KE)?;
                put_extension(&mut out, EXT_KEY_SHARE, &key_share)?;
            }
            HelloProfile::Quic {
                alpn,
                transport_parameters,
            } => {
                let mut protocols: Vec<u8> = Vec::with_capacity(alpn.len() + 1);
                put_u8_prefixed(&mut protocols, alpn, "alpn")?;
                let mut alpn_list: Vec<u8> = Vec::with_capacity(protocols.len() + 2);
                put_u16_prefixed(&mut alpn_list, &protocols, "alpn")?;

                put_extension(&mut out, EXT_SUPPORTED_GROUPS, &QUIC_GROUPS)?;
                put_extension(&mut out, EXT_ALPN, &alpn_list)?;
                put_extension(&mut out, EXT_SIGNATURE_ALGORITHMS, &QUIC_SIGNATURE_ALGORITHMS)?;
                put_extension(&mut out, EXT_KEY_SHARE, &key_share)?;
                put_extension(&mut out, EXT_PSK_KEY_EXCHANGE_MODES, &PSK_DHE_KE)?;
                put_extension(&mut out, EXT_SUPPORTED_VERSIONS, &TLS13_ONLY)?;
                put_extension(&mut out, EXT_QUIC_TRANSPORT_PARAMETERS, transport_parameters)?;
            }
        }
        Ok(out)
    }
}

/// Wraps a handshake message in a TLS record (`16 03 01 <len>`).
pub fn record(handshake: &[u8]) -> Result<Vec<u8>, TlsError> {
    let mut out: Vec<u8> = Vec::with_capacity(handshake.len() + 5);
    out.push(CONTENT_TYPE_HANDSHAKE);
    out.extend_from_slice(&LEGACY_RECORD_VERSION);
    put_u16_prefixed(&mut out, handshake, "record")?;
    Ok(out)
}

fn server_name_list(name: &str) -> Result<Vec<u8>, TlsError> {
    let mut entry: Vec<u8> = Vec::with_capacity(name.len() + 3);
    entry.push(0x00); // host_name
    put_u16_prefixed(&mut entry, name.as_bytes(), "server name")?;

    let mut list: Vec<u8> = Vec::with_capacity(entry.len() + 2);
    put_u16_prefixed(&mut list, &entry, "server name list")?;
    Ok(list)
}

fn key_share_list(key: &[u8; 32]) -> Vec<u8> {
    let mut list: Vec<u8> = Vec::with_capacity(38);
    list.extend_from_slice(&36u16.to_be_bytes());
    list.extend_from_slice(&X25519);
    list.extend_from_slice(&32u16.to_be_bytes());
    list.extend_from_slice(key);
    list
}

fn put_extension(out: &mut Vec<u8>, kind: u16, data: &[u8]) -> Result<(), TlsError> {
    out.extend_from_slice(&kind.to_be_bytes());
    put_u16_prefixed(out, data, "extension")
}

fn put_u16_prefixed(out: &mut Vec<u8>, data: &[u8], field: &'static str) -> Result<(), TlsError> {
    let length: u16 = u16::try_from(data.len()).map_err(|_| TlsError::TooLong {
        field,
        length: data.len(),
    })?;
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

fn put_u8_prefixed(out: &mut Vec<u8>, data: &[u8], field: &'static str) -> Result<(), TlsError> {
    let length: u8 = u8::try_from(data.len()).map_err(|_| TlsError::TooLong {
        field,
        length: data.len(),
    })?;
    out.push(length);
    out.extend_from_slice(data);
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
