use crate::model::{Config, ExchangeRecord, Outcome};
use crate::protocol::Connection;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Request payload for one exchange; each (rank, seq) pair is unique across
/// the run.
pub fn payload_for(rank: usize, seq: usize) -> String {
    format!("worker {rank} msg {seq}")
}

/// One worker: a single connection performing `config.messages` sequential
/// exchanges. A failure terminates this worker only; siblings keep running.
pub async fn worker(
    rank: usize,
    config: Config,
    tx: mpsc::Sender<ExchangeRecord>,
    cancel: CancellationToken,
) -> Result<()> {
    // optional ramp-up, staggered by rank
    if !config.spawn_delay.is_zero() {
        let delay = config.spawn_delay * rank as u32;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }

    let mut conn = tokio::select! {
        res = Connection::connect(config.addr, config.codec, config.connect_timeout) => {
            res.with_context(|| format!("worker {rank}: connecting to {}", config.addr))?
        }
        _ = cancel.cancelled() => return Ok(()),
    };
    debug!(rank, "connected");

    for seq in 0..config.messages {
        let begin = Utc::now();
        let result = tokio::select! {
            res = timeout(config.exchange_timeout, exchange(&mut conn, rank, seq, &config)) => {
                match res {
                    Ok(res) => res,
                    Err(_) => Err(anyhow::anyhow!(
                        "timed out after {:?}",
                        config.exchange_timeout
                    )),
                }
            }
            _ = cancel.cancelled() => return Ok(()),
        };
        let end = Utc::now();

        match result {
            Ok(()) => {
                let _ = tx
                    .send(ExchangeRecord {
                        rank,
                        seq,
                        begin,
                        end,
                        outcome: Outcome::Ok,
                    })
                    .await;
            }
            Err(e) => {
                warn!(rank, seq, "exchange failed: {:#}", e);
                let _ = tx
                    .send(ExchangeRecord {
                        rank,
                        seq,
                        begin,
                        end,
                        outcome: Outcome::Failed,
                    })
                    .await;
                return Err(e.context(format!("worker {rank}: message {seq}")));
            }
        }
    }

    Ok(())
}

async fn exchange(
    conn: &mut Connection,
    rank: usize,
    seq: usize,
    config: &Config,
) -> Result<()> {
    let request = payload_for(rank, seq);
    conn.send(&request).await.context("sending")?;
    let response = conn.recv().await.context("receiving")?;
    if config.verify_echo && response != request {
        bail!("unexpected response: sent {request:?}, got {response:?}");
    }
    Ok(())
}
