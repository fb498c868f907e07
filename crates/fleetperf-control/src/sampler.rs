//! Per-second traffic counter sampling.
//!
//! While an iteration window is open, the sampler polls the traffic
//! backend's per-connection counters on a fixed tick and accumulates
//! time-stamped samples. A failed poll loses that tick only.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Duration;

use fleetperf_common::models::Sample;

/// One connection's counters as read from the traffic backend.
#[derive(Debug, Clone)]
pub struct CxCounters {
    pub connection_id: String,
    pub rx_bytes_a: u64,
    pub rx_bytes_b: u64,
    pub drop_pct_a: f64,
    pub drop_pct_b: f64,
    /// Station signal strength, wireless endpoints only.
    pub rssi: Option<i32>,
}

/// Source of per-connection counters.
pub trait CounterSource: Send + Sync + 'static {
    fn poll(&self) -> impl std::future::Future<Output = anyhow::Result<Vec<CxCounters>>> + Send;
}

/// Counter source for runs without a co-located load generator; every
/// poll returns no connections.
pub struct IdleCounters;

impl CounterSource for IdleCounters {
    async fn poll(&self) -> anyhow::Result<Vec<CxCounters>> {
        Ok(Vec::new())
    }
}

/// Sample `source` every `tick` until `shutdown` flips, returning the
/// accumulated samples.
pub async fn run<S: CounterSource>(
    source: Arc<S>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut ticker = tokio::time::interval(tick);
    // The immediate first tick would sample before any traffic flows.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match source.poll().await {
            Ok(counters) => {
                let now = Utc::now();
                for cx in counters {
                    samples.push(Sample {
                        timestamp: now,
                        connection_id: cx.connection_id,
                        rx_bytes_a: cx.rx_bytes_a,
                        rx_bytes_b: cx.rx_bytes_b,
                        drop_pct_a: cx.drop_pct_a,
                        drop_pct_b: cx.drop_pct_b,
                        rssi: cx.rssi,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "counter poll failed, tick skipped");
            }
        }
    }

    tracing::debug!(samples = samples.len(), "sampler drained");
    samples
}
