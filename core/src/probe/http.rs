use bidi_common::config::{Config, ProbeKind};
use bidi_common::network::target::Target;
use bidi_protocols::codec::FrameSummary;
use bidi_protocols::http::{self, HTTP_PORT};

use super::{Observation, ProbeContext, ProbeOption, ProbeStatus, Prober, SpoofSettings, require_domain};
use crate::error::ProbeError;

/// Plain-text `GET /` with the target domain in the `Host` header.
pub struct HttpProber {
    settings: SpoofSettings,
}

impl HttpProber {
    pub fn from_config(config: &Config) -> Self {
        Self { settings: SpoofSettings::from_config(config, HTTP_PORT) }
    }
}

impl Prober for HttpProber {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Http
    }

    fn options(&self) -> Vec<ProbeOption> {
        self.settings.options()
    }

    fn should_read(&self) -> bool {
        false
    }

    fn send_probe(&self, target: &Target, ctx: &mut ProbeContext<'_>) -> Result<ProbeStatus, ProbeError> {
        let request: Vec<u8> = http::create_request(require_domain(target)?);
        self.settings.send_tcp(target, &request, ctx)
    }

    fn observe(&self, frame: &FrameSummary) -> Option<Observation> {
        self.settings.observe_tcp("HTTP", frame)
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
