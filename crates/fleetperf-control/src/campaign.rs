//! Iteration loop of one measurement campaign.
//!
//! Each iteration: open the traffic window (cadence + sampler), wait
//! for the window to close, hold the completion barrier, freeze the
//! collector into a snapshot, and project the report table. Devices
//! that never make it through the barrier still get their zeroed row,
//! so a flaky tablet cannot change the table's shape.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use fleetperf_common::models::{
    Device, DeviceKey, DeviceResult, IterationSnapshot, MissingReason, Sample, SampleAggregate,
};
use fleetperf_common::table::IterationTable;

use crate::barrier;
use crate::cadence::{self, CadenceConfig};
use crate::collector::Collector;
use crate::sampler::{self, CounterSource};
use crate::traffic::TrafficControl;

/// Knobs of one campaign run.
#[derive(Debug, Clone, Copy)]
pub struct CampaignConfig {
    pub iterations: u32,
    /// Traffic window shape; `cadence.total` is the iteration length.
    pub cadence: CadenceConfig,
    pub sample_tick: Duration,
    pub barrier_timeout: Duration,
    pub barrier_poll: Duration,
}

/// Everything one iteration produced.
#[derive(Debug, Serialize)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub table: IterationTable,
    pub snapshot: IterationSnapshot,
    pub samples: Vec<Sample>,
    pub aggregates: Vec<SampleAggregate>,
    pub missing: Vec<(DeviceKey, MissingReason)>,
    pub barrier_timed_out: bool,
}

/// Run the whole campaign. Returns the per-iteration outcomes; a
/// shutdown signal ends the run after tearing the current iteration
/// down, keeping only the iterations that completed.
pub async fn run<T: TrafficControl, S: CounterSource>(
    cfg: &CampaignConfig,
    roster: &[Device],
    collector: &Collector,
    traffic: Arc<T>,
    source: Arc<S>,
    mut shutdown: watch::Receiver<bool>,
) -> Vec<IterationOutcome> {
    let mut outcomes = Vec::with_capacity(cfg.iterations as usize);

    for iteration in 1..=cfg.iterations {
        if *shutdown.borrow() {
            break;
        }
        tracing::info!(iteration, of = cfg.iterations, "iteration window open");
        let window_start = Utc::now();

        let (iter_tx, iter_rx) = watch::channel(false);
        let mut cadence_handle =
            tokio::spawn(cadence::run(cfg.cadence, traffic.clone(), iter_rx.clone()));
        let sampler_handle = tokio::spawn(sampler::run(source.clone(), cfg.sample_tick, iter_rx));

        let mut interrupted = false;
        tokio::select! {
            _ = &mut cadence_handle => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    interrupted = true;
                    let _ = iter_tx.send(true);
                    let _ = cadence_handle.await;
                }
            }
        }

        if interrupted {
            let _ = sampler_handle.await;
            tracing::info!(iteration, "campaign interrupted, discarding open iteration");
            break;
        }

        let outcome = barrier::await_completion(
            roster,
            collector,
            window_start,
            cfg.barrier_timeout,
            cfg.barrier_poll,
        )
        .await;

        let _ = iter_tx.send(true);
        let samples = sampler_handle.await.unwrap_or_default();

        let mut results: BTreeMap<DeviceKey, DeviceResult> = BTreeMap::new();
        for (key, report) in outcome.reported {
            results.insert(key, DeviceResult::Reported(report));
        }
        for (key, reason) in &outcome.missing {
            results.insert(key.clone(), DeviceResult::Missing { reason: *reason });
        }
        let snapshot = IterationSnapshot::new(iteration, results);
        let table = IterationTable::project(roster, &snapshot);
        let aggregates = Sample::aggregate(&samples);

        tracing::info!(
            iteration,
            reported = roster.len() - outcome.missing.len(),
            missing = outcome.missing.len(),
            barrier_s = outcome.elapsed.as_secs_f64(),
            "iteration closed"
        );

        outcomes.push(IterationOutcome {
            iteration,
            table,
            snapshot,
            samples,
            aggregates,
            missing: outcome.missing,
            barrier_timed_out: outcome.timed_out,
        });
    }

    outcomes
}
