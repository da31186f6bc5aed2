use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use hdrhistogram::Histogram;
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::{Config, ExchangeRecord, Outcome};
use crate::stats::Summary;
use crate::worker;

/// Runs the whole load test: spawns one worker per rank, waits for every one
/// of them (success or failure), and returns the aggregate summary. The
/// elapsed time spans first spawn to last join. Callers that want no terminal
/// output pass `ProgressBar::hidden()`.
pub async fn run(config: Config, pb: ProgressBar) -> Result<Summary> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(100);

    let start = Instant::now();

    let mut set = JoinSet::new();
    for rank in 0..config.workers {
        set.spawn(worker::worker(
            rank,
            config.clone(),
            tx.clone(),
            cancel.clone(),
        ));
    }
    drop(tx);

    let collector = tokio::spawn(collect(rx, pb));

    // ctrl-c bounds the worst case when a peer stalls past every timeout
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, cancelling workers");
                cancel.cancel();
            }
        })
    };

    let mut failed_workers = 0;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("{:#}", e);
                failed_workers += 1;
            }
            Err(e) => {
                warn!("worker panicked: {}", e);
                failed_workers += 1;
            }
        }
    }
    let elapsed = start.elapsed();
    ctrl_c.abort();

    let (ok, failed, latency) = collector.await?;

    Ok(Summary {
        workers: config.workers,
        failed_workers,
        expected: config.workers * config.messages,
        ok,
        failed,
        elapsed,
        latency,
    })
}

async fn collect(
    mut rx: mpsc::Receiver<ExchangeRecord>,
    pb: ProgressBar,
) -> (usize, usize, Histogram<u64>) {
    let mut ok = 0;
    let mut failed = 0;
    let mut latency = Histogram::new(3).unwrap();
    let mut heap = BinaryHeap::new();
    let window = 1;

    while let Some(record) = rx.recv().await {
        match record.outcome {
            Outcome::Ok => {
                ok += 1;
                if let Some(us) = (record.end - record.begin).num_microseconds() {
                    let _ = latency.record(us.max(0) as u64);
                }
            }
            Outcome::Failed => failed += 1,
        }

        // completions inside a one-second sliding window give the live rate
        heap.push(Reverse(record.end));
        let ts = Utc::now();
        while let Some(Reverse(oldest)) = heap.peek() {
            if *oldest < ts - Duration::from_secs(window) {
                heap.pop();
            } else {
                break;
            }
        }
        pb.set_message(format!("{:.1} msg/s", heap.len() as f64 / window as f64));
        pb.inc(1);
    }
    pb.finish();

    (ok, failed, latency)
}
