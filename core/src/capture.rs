//! Passive observation of replies.
//!
//! The capture side opens its own datalink channel on the probing interface
//! and runs on a dedicated thread, independent of the transmitters. Every
//! frame is decoded and offered to the active prober; matches are forwarded
//! as [`Observation`]s.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, NetworkInterface};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use bidi_protocols::codec::{self, LinkType};

use crate::network::TransmitError;
use crate::network::channel::{get_config, open_eth_channel};
use crate::probe::{Observation, Prober};

pub struct CaptureHandle {
    pub rx: UnboundedReceiver<Observation>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    /// Stops the listener and waits for its thread. Observations already
    /// queued stay readable from `rx`.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Interfaces without a hardware address hand us bare IP packets.
pub fn link_type(intf: &NetworkInterface) -> LinkType {
    if intf.mac.is_some() || intf.is_loopback() {
        LinkType::Ethernet
    } else {
        LinkType::RawIp
    }
}

pub fn start_capture(intf: &NetworkInterface, prober: Arc<dyn Prober>) -> Result<CaptureHandle, TransmitError> {
    start_capture_with(intf, prober, datalink::channel)
}

pub fn start_capture_with<F>(
    intf: &NetworkInterface,
    prober: Arc<dyn Prober>,
    channel_opener: F,
) -> Result<CaptureHandle, TransmitError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let (_tx, rx) = open_eth_channel(intf, &get_config(), channel_opener)?;
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));

    let link: LinkType = link_type(intf);
    let name: String = intf.name.clone();
    let thread_stop = stop.clone();
    let thread = thread::Builder::new()
        .name(format!("capture-{name}"))
        .spawn(move || listen(rx, link, prober, queue_tx, thread_stop))
        .map_err(|source| TransmitError::Open {
            channel: format!("capture thread for {name}"),
            source,
        })?;
    debug!("Capture started on {}", intf.name);

    Ok(CaptureHandle {
        rx: queue_rx,
        stop,
        thread: Some(thread),
    })
}

fn listen(
    mut rx: Box<dyn DataLinkReceiver>,
    link: LinkType,
    prober: Arc<dyn Prober>,
    tx: UnboundedSender<Observation>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match rx.next() {
            Ok(frame) => {
                let Some(summary) = codec::decode_frame(frame, link) else { continue };
                if let Some(observation) = prober.observe(&summary) {
                    if tx.send(observation).is_err() {
                        break;
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {}
            Err(e) => {
                warn!("Capture stopped: {e}");
                break;
            }
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
