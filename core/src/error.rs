use std::fmt;
use std::io;
use std::net::IpAddr;

use thiserror::Error;

use bidi_common::network::route::RoutingError;
use bidi_protocols::codec::CodecError;
use bidi_protocols::dns::DnsError;
use bidi_protocols::quic::{KeyDerivationError, QuicError};
use bidi_protocols::tls::TlsError;

use crate::network::TransmitError;
use crate::network::tcp::BuildError;

/// The stage of a probe attempt that failed, printed in result lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeStep {
    Payload,
    Route,
    Build,
    KeyDerivation,
    Serialize,
    Transmit,
    Read,
    Worker,
}

impl ProbeStep {
    pub fn name(&self) -> &'static str {
        match self {
            ProbeStep::Payload => "payload",
            ProbeStep::Route => "route",
            ProbeStep::Build => "build",
            ProbeStep::KeyDerivation => "key-derivation",
            ProbeStep::Serialize => "serialize",
            ProbeStep::Transmit => "transmit",
            ProbeStep::Read => "read",
            ProbeStep::Worker => "worker",
        }
    }
}

impl fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("target has no domain")]
    MissingDomain,
    #[error(transparent)]
    Dns(#[from] DnsError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Quic(QuicError),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error("source {src} and destination {destination} are different address families")]
    AddressFamilyMismatch { src: IpAddr, destination: IpAddr },
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Serialization(#[from] CodecError),
    #[error(transparent)]
    Transmit(#[from] TransmitError),
    #[error("{0}")]
    Read(#[source] io::Error),
    #[error("worker aborted: {0}")]
    Aborted(String),
}

impl ProbeError {
    pub fn step(&self) -> ProbeStep {
        match self {
            ProbeError::Payload(_) => ProbeStep::Payload,
            ProbeError::Routing(_) => ProbeStep::Route,
            ProbeError::AddressFamilyMismatch { .. } => ProbeStep::Build,
            ProbeError::KeyDerivation(_) => ProbeStep::KeyDerivation,
            ProbeError::Serialization(_) => ProbeStep::Serialize,
            ProbeError::Transmit(_) => ProbeStep::Transmit,
            ProbeError::Read(_) => ProbeStep::Read,
            ProbeError::Aborted(_) => ProbeStep::Worker,
        }
    }
}

impl From<BuildError> for ProbeError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::AddressFamilyMismatch { src, destination } => {
                ProbeError::AddressFamilyMismatch { src, destination }
            }
            BuildError::Routing(e) => ProbeError::Routing(e),
            BuildError::Serialization(e) => ProbeError::Serialization(e),
        }
    }
}

impl From<DnsError> for ProbeError {
    fn from(err: DnsError) -> Self {
        ProbeError::Payload(PayloadError::Dns(err))
    }
}

impl From<TlsError> for ProbeError {
    fn from(err: TlsError) -> Self {
        ProbeError::Payload(PayloadError::Tls(err))
    }
}

/// Key schedule failures keep their own step so they are never mistaken for
/// an encoding problem.
impl From<QuicError> for ProbeError {
    fn from(err: QuicError) -> Self {
        match err {
            QuicError::KeyDerivation(e) => ProbeError::KeyDerivation(e),
            other => ProbeError::Payload(PayloadError::Quic(other)),
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
    use std::net::Ipv4Addr;

    #[test]
    fn key_derivation_errors_keep_their_step() {
        let err: ProbeError = QuicError::KeyDerivation(KeyDerivationError::EmptyConnectionId).into();
        assert_eq!(err.step(), ProbeStep::KeyDerivation);

        let err: ProbeError = QuicError::VarintOutOfRange(u64::MAX).into();
        assert_eq!(err.step(), ProbeStep::Payload);
    }

    #[test]
    fn build_errors_map_to_their_stage() {
        let src = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let destination: IpAddr = "2001:db8::1".parse().unwrap();

        let mismatch: ProbeError = BuildError::AddressFamilyMismatch { src, destination }.into();
        assert_eq!(mismatch.step(), ProbeStep::Build);

        let routing: ProbeError = BuildError::Routing(RoutingError::UnknownInterface("eth9".into())).into();
        assert_eq!(routing.step(), ProbeStep::Route);

        let codec: ProbeError = BuildError::Serialization(CodecError::MissingLinkLayer).into();
        assert_eq!(codec.step(), ProbeStep::Serialize);
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(ProbeStep::KeyDerivation.to_string(), "key-derivation");
        assert_eq!(ProbeStep::Transmit.to_string(), "transmit");
        assert_eq!(PayloadError::MissingDomain.to_string(), "target has no domain");
    }
}
