use colored::*;
use pnet::datalink::{self, NetworkInterface};

use bidi_common::config::{Config, ProbeKind};
use bidi_common::utils::interface::NetworkInterfaceExtension;
use bidi_core::probe::BuildProber;

use crate::terminal::{colors, print};

pub fn list() {
    print::header("probe types");
    for (idx, kind) in ProbeKind::ALL.iter().enumerate() {
        let prober = kind.build(&Config { probe: *kind, ..Config::default() });
        print::tree_head(idx, kind.name());
        let options: Vec<String> = prober.options().iter().map(|o| o.to_string()).collect();
        print::as_tree_one_level(&options);
    }

    print::header("interfaces");
    let interfaces: Vec<NetworkInterface> = datalink::interfaces();
    for intf in &interfaces {
        let status: ColoredString = if intf.can_send_probes() {
            "usable".color(colors::PRIMARY)
        } else {
            "unusable".color(colors::FAILURE)
        };
        print::print_status(format!("{} [{status}]", intf.summary()));
    }
}
