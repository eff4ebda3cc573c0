//! # QUIC v1 Initial Packets
//!
//! Everything needed to emit one protected client Initial packet (RFC 9000 /
//! RFC 9001):
//! * [`keys`]: the HKDF key schedule from the destination connection ID.
//! * [`protect`]: AES-128-GCM payload protection and AES-ECB header
//!   protection.
//! * [`packet`]: variable-length integers, frames, transport parameters and
//!   the long header layout.
//!
//! Key material is derived per connection ID and dropped (zeroized) as soon as
//! the packet is sealed.

pub mod keys;
pub mod packet;
pub mod protect;

use thiserror::Error;

pub use keys::{KeyDerivationError, KeyMaterial, derive_keys, derive_server_keys};
pub use packet::{InitialPacket, client_transport_parameters, crypto_frame};
pub use protect::{ProtectionError, decrypt, encrypt};

pub const QUIC_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuicError {
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Protection(#[from] ProtectionError),
    #[error("connection id of {0} bytes exceeds 20")]
    ConnectionIdTooLong(usize),
    #[error("value {0} does not fit a variable-length integer")]
    VarintOutOfRange(u64),
}
