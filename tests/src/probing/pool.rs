use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use bidi_common::config::{ProbeKind, TransmitMode};
use bidi_common::network::target::{self, Target};
use bidi_core::error::ProbeStep;
use bidi_core::network::{Frame, FrameSink, TransmitError};
use bidi_core::pool::WorkerPool;
use bidi_core::probe::{ProbeOutcome, ProbeSession, build_prober};

use super::common::{LanTable, RecordingSink, config, session};

fn sessions(workers: usize, sink: &RecordingSink) -> Vec<ProbeSession> {
    let config = config(ProbeKind::Tls, TransmitMode::Link);
    (0..workers).map(|w| session(w, &config, LanTable::new(), sink)).collect()
}

fn targets(count: u32) -> Vec<Target> {
    (0..count)
        .map(|i| Target::new(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + i)), "example.com"))
        .collect()
}

async fn run(workers: usize, targets: Vec<Target>, delay: Duration) -> (Vec<ProbeOutcome>, RecordingSink) {
    let sink = RecordingSink::default();
    let (pool, mut rx) = WorkerPool::start(sessions(workers, &sink), delay, 4);
    let queue = pool.queue();

    let feeder = tokio::spawn(async move {
        for target in targets {
            queue.submit(target).await.unwrap();
        }
    });
    let collector = tokio::spawn(async move {
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    });

    feeder.await.unwrap();
    pool.join().await;
    (collector.await.unwrap(), sink)
}

#[tokio::test]
async fn outcomes_match_targets_for_any_pool_size() {
    for workers in [1, 3, 8] {
        for count in [0, 1, 40] {
            let (outcomes, sink) = run(workers, targets(count), Duration::ZERO).await;
            assert_eq!(outcomes.len(), count as usize, "{workers} workers, {count} targets");

            let unique: HashSet<IpAddr> = outcomes.iter().map(|o| o.target.destination).collect();
            assert_eq!(unique.len(), count as usize);
            assert_eq!(sink.frames().len(), count as usize);
        }
    }
}

#[tokio::test]
async fn probe_delay_spaces_attempts_per_worker() {
    let started = std::time::Instant::now();
    let (outcomes, _) = run(1, targets(3), Duration::from_millis(30)).await;
    assert_eq!(outcomes.len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(90));
}

#[tokio::test]
async fn failed_targets_still_report_and_pool_continues() {
    let mut input = targets(5);
    input.push(Target::new("10.9.9.9".parse().unwrap(), ""));
    input.extend(target::expand_line("10.8.8.8", &[], None).unwrap());

    let (outcomes, sink) = run(2, input, Duration::ZERO).await;
    assert_eq!(outcomes.len(), 7);

    let failed: Vec<String> = outcomes.iter().filter(|o| o.result.is_err()).map(|o| o.to_string()).collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|line| line.contains(" - error payload: ")));
    assert_eq!(sink.frames().len(), 5);
}

#[tokio::test]
async fn workers_spread_the_load() {
    let (outcomes, _) = run(4, targets(64), Duration::from_millis(1)).await;
    let workers: HashSet<usize> = outcomes.iter().map(|o| o.worker).collect();
    assert!(workers.len() > 1);
}

struct ExplodingSink;

impl FrameSink for ExplodingSink {
    fn send(&mut self, _frame: &Frame) -> Result<(), TransmitError> {
        panic!("transmit handle torn down");
    }
}

#[tokio::test]
async fn every_target_reports_even_when_all_workers_panic() {
    let config = config(ProbeKind::Http, TransmitMode::Link);
    let sessions: Vec<ProbeSession> = (0..2)
        .map(|w| ProbeSession::new(w, build_prober(&config), Arc::new(LanTable::new()), Some(Box::new(ExplodingSink)), 0))
        .collect();
    let (pool, mut rx) = WorkerPool::start(sessions, Duration::ZERO, 16);

    for target in targets(10) {
        pool.submit(target).await.unwrap();
    }
    pool.join().await;

    let mut outcomes = Vec::new();
    while let Some(outcome) = rx.recv().await {
        outcomes.push(outcome);
    }
    assert_eq!(outcomes.len(), 10);
    let unique: HashSet<IpAddr> = outcomes.iter().map(|o| o.target.destination).collect();
    assert_eq!(unique.len(), 10);
    for outcome in &outcomes {
        assert_eq!(outcome.result.as_ref().unwrap_err().step(), ProbeStep::Worker);
        assert!(outcome.to_string().contains("error worker: "));
    }
}
