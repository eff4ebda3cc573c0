use std::fmt;

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// RFC 9001 §5.2 salt for QUIC version 1.
pub const INITIAL_SALT_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad,
    0xcc, 0xbb, 0x7f, 0x0a,
];

pub const MAX_CID_LEN: usize = 20;

const CLIENT_IN: &[u8] = b"client in";
const SERVER_IN: &[u8] = b"server in";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    #[error("destination connection id is empty")]
    EmptyConnectionId,
    #[error("connection id of {0} bytes exceeds 20")]
    ConnectionIdTooLong(usize),
    #[error("invalid pseudo-random key length")]
    PrkLength,
    #[error("hkdf expand failed for label '{0}'")]
    Expand(&'static str),
}

/// Initial packet protection keys for one direction of one connection ID.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    pub key: [u8; 16],
    pub iv: [u8; 12],
    pub hp: [u8; 16],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial { .. }")
    }
}

/// Client Initial keys for `dcid`. Pure: the same connection ID always yields
/// the same material.
pub fn derive_keys(dcid: &[u8]) -> Result<KeyMaterial, KeyDerivationError> {
    derive(dcid, CLIENT_IN, "client in")
}

/// Server Initial keys for `dcid`, used to open what a server would send.
pub fn derive_server_keys(dcid: &[u8]) -> Result<KeyMaterial, KeyDerivationError> {
    derive(dcid, SERVER_IN, "server in")
}

fn derive(dcid: &[u8], direction: &[u8], name: &'static str) -> Result<KeyMaterial, KeyDerivationError> {
    if dcid.is_empty() {
        return Err(KeyDerivationError::EmptyConnectionId);
    }
    if dcid.len() > MAX_CID_LEN {
        return Err(KeyDerivationError::ConnectionIdTooLong(dcid.len()));
    }

    let (_, initial) = Hkdf::<Sha256>::extract(Some(&INITIAL_SALT_V1), dcid);

    let mut secret: Zeroizing<[u8; 32]> = Zeroizing::new([0u8; 32]);
    expand_label(&initial, direction, name, &mut secret[..])?;

    let hk = Hkdf::<Sha256>::from_prk(&secret[..]).map_err(|_| KeyDerivationError::PrkLength)?;
    let mut material = KeyMaterial {
        key: [0u8; 16],
        iv: [0u8; 12],
        hp: [0u8; 16],
    };
    expand_label(&hk, b"quic key", "quic key", &mut material.key)?;
    expand_label(&hk, b"quic iv", "quic iv", &mut material.iv)?;
    expand_label(&hk, b"quic hp", "quic hp", &mut material.hp)?;

    Ok(material)
}

/// HKDF-Expand-Label from TLS 1.3 (RFC 8446 §7.1) with an empty context.
fn expand_label(
    hk: &Hkdf<Sha256>,
    label: &[u8],
    name: &'static str,
    out: &mut [u8],
) -> Result<(), KeyDerivationError> {
    const PREFIX: &[u8] = b"tls13 ";

    let mut info: Vec<u8> = Vec::with_capacity(4 + PREFIX.len() + label.len());
    info.extend_from_slice(&(out.len() as u16).to_be_bytes());
    info.push((PREFIX.len() + label.len()) as u8);
    info.extend_from_slice(PREFIX);
    info.extend_from_slice(label);
    info.push(0);

    hk.expand(&info, out).map_err(|_| KeyDerivationError::Expand(name))
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

    #[test]
    fn derives_known_client_keys() {
        let km = derive_keys(&hex::decode("0001020304050607").unwrap()).unwrap();
        assert_eq!(hex::encode(km.key), "b14b918124fda5c8d79847602fa3520b");
        assert_eq!(hex::encode(km.iv), "ddbc15dea80925a55686a7df");
        assert_eq!(hex::encode(km.hp), "6df4e9d737cdf714711d7c617ee82981");
    }

    #[test]
    fn matches_rfc9001_appendix_a1() {
        let dcid = hex::decode("8394c8f03e515708").unwrap();

        let client = derive_keys(&dcid).unwrap();
        assert_eq!(hex::encode(client.key), "1f369613dd76d5467730efcbe3b1a22d");
        assert_eq!(hex::encode(client.iv), "fa044b2f42a3fd3b46fb255c");
        assert_eq!(hex::encode(client.hp), "9f50449e04a0e810283a1e9933adedd2");

        let server = derive_server_keys(&dcid).unwrap();
        assert_eq!(hex::encode(server.key), "cf3a5331653c364c88f0f379b6067e37");
        assert_eq!(hex::encode(server.iv), "0ac1493ca1905853b0bba03e");
        assert_eq!(hex::encode(server.hp), "c206b8d9b9f0f37644430b490eeaa314");
    }

    #[test]
    fn derivation_is_deterministic_and_cid_bound() {
        let a = derive_keys(b"\x01\x02\x03\x04\x05\x06\x07\x08").unwrap();
        let b = derive_keys(b"\x01\x02\x03\x04\x05\x06\x07\x08").unwrap();
        let c = derive_keys(b"\x01\x02\x03\x04\x05\x06\x07\x09").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.key, c.key);
        assert_ne!(a.iv, c.iv);
    }

    #[test]
    fn rejects_bad_connection_ids() {
        assert_eq!(derive_keys(&[]), Err(KeyDerivationError::EmptyConnectionId));
        assert_eq!(
            derive_keys(&[0u8; 21]),
            Err(KeyDerivationError::ConnectionIdTooLong(21))
        );
    }

    #[test]
    fn debug_output_hides_keys() {
        let km = derive_keys(&[7u8; 8]).unwrap();
        assert_eq!(format!("{km:?}"), "KeyMaterial { .. }");
    }
}
