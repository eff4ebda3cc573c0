use std::fs;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use colored::*;
use is_root::is_root;
use pnet::datalink::NetworkInterface;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Instrument, Span, error, info, warn};

use bidi_common::config::{Config, TransmitMode};
use bidi_common::network::route::{self, RouteTable, SystemRouteTable};
use bidi_common::network::target;
use bidi_core::capture::{self, CaptureHandle};
use bidi_core::network::FrameSink;
use bidi_core::network::channel::LinkTransmitter;
use bidi_core::network::transport::RawTransmitter;
use bidi_core::pool::{DEFAULT_QUEUE_DEPTH, TargetQueue, WorkerPool};
use bidi_core::probe::{Observation, ProbeSession, Prober, build_prober};

use crate::commands::ProbeArgs;
use crate::terminal::{print, spinner};
use crate::terminal::spinner::Tally;

pub async fn probe(args: ProbeArgs) -> anyhow::Result<()> {
    let config: Config = args.to_config();
    let domains: Vec<String> = match &args.domains {
        Some(path) => target::parse_domains(
            &fs::read_to_string(path).with_context(|| format!("reading domains from {}", path.display()))?,
        ),
        None => Vec::new(),
    };

    if !is_root() {
        warn!("Not running as root; raw sockets and capture will most likely be refused");
    }

    let routes: Arc<dyn RouteTable> = Arc::new(SystemRouteTable);
    let prober: Arc<dyn Prober> = build_prober(&config);
    describe(&config, prober.as_ref(), domains.len());

    let needs_interface: bool =
        config.capture || (prober.needs_sink() && config.transmit_mode == TransmitMode::Link);
    let interface: Option<NetworkInterface> = if needs_interface {
        Some(route::find_interface(routes.as_ref(), &config.interface)?)
    } else {
        None
    };

    let sessions: Vec<ProbeSession> = open_sessions(&config, &prober, &routes, interface.as_ref())?;
    let mut capture: Option<CaptureHandle> = match (&interface, config.capture) {
        (Some(intf), true) => match capture::start_capture(intf, prober.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Capture unavailable on {}: {e}", intf.name);
                None
            }
        },
        _ => None,
    };

    let start_time: Instant = Instant::now();
    let span: Span = spinner::start_probe_spinner(config.probe);
    let tally: Tally = run_probes(&config, sessions, domains, capture, span.clone())
        .instrument(span)
        .await?;

    summary(&tally, start_time);
    Ok(())
}

/// Feeds the pool, prints outcomes and observations as they arrive, then
/// gives the capture `read_timeout` to catch late replies.
async fn run_probes(
    config: &Config,
    sessions: Vec<ProbeSession>,
    domains: Vec<String>,
    mut capture: Option<CaptureHandle>,
    span: Span,
) -> anyhow::Result<Tally> {
    let (pool, mut outcomes) = WorkerPool::start(sessions, config.probe_delay, DEFAULT_QUEUE_DEPTH);
    let feeder = tokio::spawn(feed_targets(pool.queue(), domains, config.local_addr));
    let workers = tokio::spawn(pool.join());

    let mut tally = Tally::default();
    let mut stdout_open: bool = true;
    while stdout_open {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Some(outcome) => {
                    tally.record(&outcome);
                    stdout_open = keep_writing(print::result_line(&outcome.to_string()))?;
                    spinner::report_progress(&span, &tally);
                }
                None => break,
            },
            Some(observation) = next_observation(&mut capture) => {
                tally.observed += 1;
                stdout_open = keep_writing(print::result_line(&observation.to_string()))?;
                spinner::report_progress(&span, &tally);
            }
        }
    }

    if !stdout_open {
        warn!("Stdout closed, stopping the run");
        // Workers stop at their next send once nobody is listening.
        drop(outcomes);
        feeder.abort();
    }
    match feeder.await {
        Ok(Ok(submitted)) => info!("Submitted {submitted} targets"),
        Ok(Err(e)) => error!("Target input failed: {e:#}"),
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("Target reader panicked: {e}"),
    }
    workers.await.context("joining probe workers")?;

    if let Some(mut handle) = capture.take() {
        if stdout_open {
            // late replies still count
            let late = tokio::time::timeout(config.read_timeout, async {
                while let Some(observation) = handle.rx.recv().await {
                    tally.observed += 1;
                    if !keep_writing(print::result_line(&observation.to_string()))? {
                        break;
                    }
                }
                Ok::<(), anyhow::Error>(())
            })
            .await;
            if let Ok(result) = late {
                result?;
            }
        }
        tokio::task::spawn_blocking(move || handle.stop())
            .await
            .context("stopping capture")?;
    }

    Ok(tally)
}

/// `false` once stdout has gone away (`bidi ... | head`); any other write
/// failure ends the run.
fn keep_writing(result: io::Result<()>) -> anyhow::Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(false),
        Err(e) => Err(e).context("writing results to stdout"),
    }
}

fn describe(config: &Config, prober: &dyn Prober, domain_count: usize) {
    print::header("probe run");
    let rows: [(&str, String); 5] = [
        ("type", prober.kind().to_string()),
        ("workers", config.workers.to_string()),
        ("interface", config.interface.clone()),
        ("seed", config.seed.to_string()),
        ("domains", domain_count.to_string()),
    ];
    for (key, value) in &rows {
        print::aligned_line(key, value, 9);
    }
    let options: Vec<String> = prober.options().iter().map(|o| o.to_string()).collect();
    print::aligned_line("options", &options.join(" "), 9);
}

fn summary(tally: &Tally, start_time: Instant) {
    print::fat_separator();
    let elapsed: ColoredString = format!("{:.2}s", start_time.elapsed().as_secs_f64()).bold().yellow();
    info!(
        "{} probes in {elapsed}: {} sent, {} failed, {} observations",
        tally.total(),
        tally.sent.to_string().green().bold(),
        tally.failed.to_string().red().bold(),
        tally.observed.to_string().cyan().bold()
    );
}

async fn next_observation(capture: &mut Option<CaptureHandle>) -> Option<Observation> {
    match capture {
        Some(handle) => handle.rx.recv().await,
        None => std::future::pending().await,
    }
}

/// One transmitter per worker; DNS uses ordinary sockets and gets none.
fn open_sessions(
    config: &Config,
    prober: &Arc<dyn Prober>,
    routes: &Arc<dyn RouteTable>,
    interface: Option<&NetworkInterface>,
) -> anyhow::Result<Vec<ProbeSession>> {
    (0..config.workers)
        .map(|worker| {
            let sink: Option<Box<dyn FrameSink>> = if prober.needs_sink() {
                Some(open_sink(config.transmit_mode, interface)?)
            } else {
                None
            };
            Ok(ProbeSession::new(worker, prober.clone(), routes.clone(), sink, config.seed))
        })
        .collect()
}

fn open_sink(mode: TransmitMode, interface: Option<&NetworkInterface>) -> anyhow::Result<Box<dyn FrameSink>> {
    match mode {
        TransmitMode::Link => {
            let intf: &NetworkInterface = interface.context("link mode needs an interface")?;
            let tx = LinkTransmitter::open(intf).with_context(|| format!("opening transmitter on {}", intf.name))?;
            Ok(Box::new(tx))
        }
        TransmitMode::Raw => Ok(Box::new(RawTransmitter::new())),
    }
}

/// Streams stdin into the pool. Malformed lines are logged and skipped.
async fn feed_targets(queue: TargetQueue, domains: Vec<String>, hint: Option<IpAddr>) -> anyhow::Result<usize> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut submitted: usize = 0;
    while let Some(line) = lines.next_line().await.context("reading targets from stdin")? {
        let targets = match target::expand_line(&line, &domains, hint) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Skipping target line: {e}");
                continue;
            }
        };
        for target in targets {
            if queue.submit(target).await.is_err() {
                return Ok(submitted);
            }
            submitted += 1;
        }
    }
    Ok(submitted)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
