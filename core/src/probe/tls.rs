use rand::Rng;

use bidi_common::config::{Config, ProbeKind};
use bidi_common::network::target::Target;
use bidi_protocols::codec::FrameSummary;
use bidi_protocols::tls::{self, ClientHello, HelloProfile, TLS_PORT};

use super::{Observation, ProbeContext, ProbeOption, ProbeStatus, Prober, SpoofSettings, require_domain};
use crate::error::ProbeError;

/// A TLS 1.3 ClientHello record with the target domain as SNI.
pub struct TlsProber {
    settings: SpoofSettings,
}

impl TlsProber {
    pub fn from_config(config: &Config) -> Self {
        Self { settings: SpoofSettings::from_config(config, TLS_PORT) }
    }
}

/// Random, session id and key share all come from the worker's generator.
pub fn client_hello_record<R: Rng + ?Sized>(server_name: &str, rng: &mut R) -> Result<Vec<u8>, ProbeError> {
    let random: [u8; 32] = rng.random();
    let session_id: [u8; 32] = rng.random();
    let key_share: [u8; 32] = rng.random();
    let hello = ClientHello {
        server_name: server_name.to_string(),
        random,
        session_id: session_id.to_vec(),
        key_share,
        profile: HelloProfile::Tcp,
    };
    Ok(tls::record(&hello.encode()?)?)
}

impl Prober for TlsProber {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Tls
    }

    fn options(&self) -> Vec<ProbeOption> {
        self.settings.options()
    }

    fn should_read(&self) -> bool {
        false
    }

    fn send_probe(&self, target: &Target, ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError> {
        let record: Vec<u8> = client_hello_record(require_domain(target)?, ctx.rng)?;
        self.settings.send_tcp(target, &record, ctx)
    }

    fn observe(&self, frame: &FrameSummary) -> Option<Observation> {
        self.settings.observe_tcp("TLS", frame)
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
