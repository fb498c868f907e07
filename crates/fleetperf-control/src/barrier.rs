//! End-of-iteration synchronization barrier.
//!
//! After an iteration's traffic window closes, the runner waits for
//! every roster device to have pushed a result stamped inside the
//! window. Agents push over HTTP on their own schedule, so the barrier
//! polls the collector; a bounded timeout keeps one dead tablet from
//! wedging the whole campaign.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use fleetperf_common::models::{AgentReport, Device, DeviceKey, MissingReason};
use fleetperf_common::units::normalize_source_key;

use crate::collector::Collector;

/// What the barrier saw when it released.
#[derive(Debug)]
pub struct BarrierOutcome {
    /// Devices with a report stamped inside the window.
    pub reported: Vec<(DeviceKey, AgentReport)>,
    /// Devices with nothing usable, and why.
    pub missing: Vec<(DeviceKey, MissingReason)>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// Find a device's report in a collector snapshot. Agents key their
/// posts by IP when they know it, falling back to device id or serial,
/// so the lookup tries the same identities in order.
fn find_report<'a>(
    device: &Device,
    reports: &'a HashMap<String, AgentReport>,
) -> Option<&'a AgentReport> {
    for id in [&device.ip, device.key.as_str(), &device.serial] {
        if id.is_empty() {
            continue;
        }
        if let Some(report) = reports.get(&normalize_source_key(id)) {
            return Some(report);
        }
    }
    None
}

/// Split the roster into reported and missing against one snapshot of
/// the collector. A report older than `window_start` belongs to a
/// previous iteration and counts as missing.
pub fn completion_status(
    roster: &[Device],
    reports: &HashMap<String, AgentReport>,
    window_start: DateTime<Utc>,
) -> (Vec<(DeviceKey, AgentReport)>, Vec<(DeviceKey, MissingReason)>) {
    let mut reported = Vec::new();
    let mut missing = Vec::new();

    for device in roster {
        match find_report(device, reports) {
            Some(report) if report.received_at >= window_start => {
                reported.push((device.key.clone(), report.clone()));
            }
            Some(_) => missing.push((device.key.clone(), MissingReason::Timeout)),
            None => missing.push((device.key.clone(), MissingReason::NeverContacted)),
        }
    }

    (reported, missing)
}

/// Poll the collector until every roster device has reported inside the
/// window, or `timeout` elapses.
pub async fn await_completion(
    roster: &[Device],
    collector: &Collector,
    window_start: DateTime<Utc>,
    timeout: Duration,
    poll: Duration,
) -> BarrierOutcome {
    let started = Instant::now();

    loop {
        let snapshot = collector.get_all();
        let (reported, missing) = completion_status(roster, &snapshot, window_start);

        if missing.is_empty() {
            return BarrierOutcome {
                reported,
                missing,
                timed_out: false,
                elapsed: started.elapsed(),
            };
        }
        if started.elapsed() >= timeout {
            for (key, reason) in &missing {
                tracing::warn!(device = %key, reason = %reason, "barrier released without device");
            }
            return BarrierOutcome {
                reported,
                missing,
                timed_out: true,
                elapsed: started.elapsed(),
            };
        }

        tracing::debug!(
            reported = reported.len(),
            waiting = missing.len(),
            "barrier waiting"
        );
        tokio::time::sleep(poll).await;
    }
}
