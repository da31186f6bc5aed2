use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use console::style;
use hdrhistogram::Histogram;
use serde::Serialize;

/// Aggregate result of one run, assembled by the driver after every worker
/// has finished.
pub struct Summary {
    pub workers: usize,
    pub failed_workers: usize,
    pub expected: usize,
    pub ok: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Per-exchange round-trip latency in microseconds, successes only.
    pub latency: Histogram<u64>,
}

impl Summary {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.ok as f64 / secs
        } else {
            0.0
        }
    }

    pub fn print(&self) {
        println!();
        println!(
            "workers: {} total, {} failed",
            self.workers,
            paint(self.failed_workers)
        );
        println!(
            "exchanges: {} ok, {} failed, {} expected",
            style(self.ok).green(),
            paint(self.failed),
            self.expected
        );
        println!(
            "elapsed: {:.3}s, throughput: {:.1} msg/s",
            self.elapsed.as_secs_f64(),
            self.throughput()
        );
        if self.latency.len() > 0 {
            println!(
                "latency: mean {:.2?}, p50 {:.2?}, p90 {:.2?}, p99 {:.2?}, max {:.2?}",
                Duration::from_micros(self.latency.mean() as u64),
                Duration::from_micros(self.latency.value_at_quantile(0.50)),
                Duration::from_micros(self.latency.value_at_quantile(0.90)),
                Duration::from_micros(self.latency.value_at_quantile(0.99)),
                Duration::from_micros(self.latency.max()),
            );
        }
    }

    pub fn write_json<W: Write>(&self, out: W) -> Result<()> {
        serde_json::to_writer_pretty(out, &Report::from(self))?;
        Ok(())
    }
}

fn paint(count: usize) -> console::StyledObject<usize> {
    if count > 0 {
        style(count).red()
    } else {
        style(count).green()
    }
}

#[derive(Serialize)]
struct Report {
    workers: usize,
    failed_workers: usize,
    exchanges_expected: usize,
    exchanges_ok: usize,
    exchanges_failed: usize,
    elapsed_secs: f64,
    throughput_msg_per_sec: f64,
    latency_us: LatencyReport,
}

#[derive(Serialize)]
struct LatencyReport {
    mean: u64,
    p50: u64,
    p90: u64,
    p99: u64,
    max: u64,
}

impl From<&Summary> for Report {
    fn from(summary: &Summary) -> Self {
        Self {
            workers: summary.workers,
            failed_workers: summary.failed_workers,
            exchanges_expected: summary.expected,
            exchanges_ok: summary.ok,
            exchanges_failed: summary.failed,
            elapsed_secs: summary.elapsed.as_secs_f64(),
            throughput_msg_per_sec: summary.throughput(),
            latency_us: LatencyReport {
                mean: summary.latency.mean() as u64,
                p50: summary.latency.value_at_quantile(0.50),
                p90: summary.latency.value_at_quantile(0.90),
                p99: summary.latency.value_at_quantile(0.99),
                max: summary.latency.max(),
            },
        }
    }
}
