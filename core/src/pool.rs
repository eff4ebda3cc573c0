//! # Probe Worker Pool
//!
//! `N` workers pull targets from one bounded queue. Each worker owns a
//! [`ProbeSession`] and runs every attempt on the blocking thread pool, since
//! raw sends and DNS reads block. Every target yields exactly one
//! [`ProbeOutcome`], failures included. Closing the queue lets the workers
//! drain what is left and exit.
//!
//! A worker whose attempt panics loses its session. It reports that target
//! as aborted and retires, unless it was the last live worker, in which case
//! it keeps pulling and reports every remaining target as aborted so the
//! queue still drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use bidi_common::network::target::Target;

use crate::error::ProbeError;
use crate::probe::{ProbeOutcome, ProbeSession};

pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// The queue has been closed; a normal shutdown signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("target queue closed")]
pub struct QueueClosed;

/// Cloneable handle for feeding targets into the pool.
#[derive(Clone)]
pub struct TargetQueue {
    tx: Sender<Target>,
}

impl TargetQueue {
    /// Waits for room in the queue.
    pub async fn submit(&self, target: Target) -> Result<(), QueueClosed> {
        self.tx.send(target).await.map_err(|_| QueueClosed)
    }
}

pub struct WorkerPool {
    queue: TargetQueue,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts one worker per session.
    pub fn start(
        sessions: Vec<ProbeSession>,
        probe_delay: Duration,
        queue_depth: usize,
    ) -> (Self, UnboundedReceiver<ProbeOutcome>) {
        let (tx, rx) = mpsc::channel::<Target>(queue_depth.max(1));
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<ProbeOutcome>();
        let shared_rx: Arc<Mutex<Receiver<Target>>> = Arc::new(Mutex::new(rx));
        let live: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(sessions.len()));

        let workers: Vec<JoinHandle<()>> = sessions
            .into_iter()
            .map(|session| {
                tokio::spawn(worker_loop(
                    session,
                    shared_rx.clone(),
                    outcome_tx.clone(),
                    live.clone(),
                    probe_delay,
                ))
            })
            .collect();
        debug!("Started {} probe workers", workers.len());

        (Self { queue: TargetQueue { tx }, workers }, outcome_rx)
    }

    pub fn queue(&self) -> TargetQueue {
        self.queue.clone()
    }

    pub async fn submit(&self, target: Target) -> Result<(), QueueClosed> {
        self.queue.submit(target).await
    }

    /// Closes the pool's own queue handle and waits for every worker to
    /// drain the queue and exit. Workers only stop once every
    /// [`TargetQueue`] clone has been dropped as well.
    pub async fn join(self) {
        let Self { queue, workers } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Probe worker failed: {e}");
            }
        }
    }
}

async fn worker_loop(
    mut session: ProbeSession,
    queue: Arc<Mutex<Receiver<Target>>>,
    outcomes: UnboundedSender<ProbeOutcome>,
    live: Arc<AtomicUsize>,
    probe_delay: Duration,
) {
    let worker: usize = session.worker();
    loop {
        let next: Option<Target> = queue.lock().await.recv().await;
        let Some(target) = next else { break };

        let attempt_target: Target = target.clone();
        let attempt = tokio::task::spawn_blocking(move || {
            let result = session.run(&attempt_target);
            (session, result)
        });
        let outcome: ProbeOutcome = match attempt.await {
            Ok((returned, result)) => {
                session = returned;
                if let Err(e) = &result {
                    warn!(
                        "Probe to {} ({}) failed at {}: {e}",
                        target.destination,
                        target.domain_label(),
                        e.step()
                    );
                }
                ProbeOutcome { worker, target, result }
            }
            Err(e) => {
                // The session went down with the task.
                error!("Probe worker {worker} aborted on {}: {e}", target.destination);
                let reason: String = e.to_string();
                if outcomes.send(aborted(worker, target, &reason)).is_err() {
                    return;
                }
                if live.fetch_sub(1, Ordering::AcqRel) == 1 {
                    drain_aborted(worker, &queue, &outcomes, &reason).await;
                }
                return;
            }
        };

        if outcomes.send(outcome).is_err() {
            break;
        }
        if !probe_delay.is_zero() {
            tokio::time::sleep(probe_delay).await;
        }
    }
    debug!("Probe worker {worker} finished");
}

/// Reports every target still queued as aborted. Runs on the last worker to
/// lose its session, so nothing is left waiting once the queue closes.
async fn drain_aborted(
    worker: usize,
    queue: &Mutex<Receiver<Target>>,
    outcomes: &UnboundedSender<ProbeOutcome>,
    reason: &str,
) {
    warn!("No probe workers left, reporting remaining targets as aborted");
    loop {
        let next: Option<Target> = queue.lock().await.recv().await;
        let Some(target) = next else { break };
        if outcomes.send(aborted(worker, target, format!("no live workers after {reason}"))).is_err() {
            break;
        }
    }
}

/// Outcome for a target whose worker died before it could report.
pub fn aborted(worker: usize, target: Target, reason: impl ToString) -> ProbeOutcome {
    ProbeOutcome {
        worker,
        target,
        result: Err(ProbeError::Aborted(reason.to_string())),
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
