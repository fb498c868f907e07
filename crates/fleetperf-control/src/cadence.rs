//! Iteration traffic cadence.
//!
//! One iteration runs background load for a total window, optionally
//! chopped into run/pause cycles (run `stop_interval`, pause `pause`,
//! repeat). The phase is a pure function of elapsed time so the
//! schedule is testable without sleeping; the async loop only samples
//! it on a coarse tick and fires transitions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::traffic::TrafficControl;

/// Supervising tick of the cadence loop.
pub const TICK: Duration = Duration::from_millis(200);

/// Shape of one iteration's traffic window.
#[derive(Debug, Clone, Copy)]
pub struct CadenceConfig {
    /// Length of the whole window.
    pub total: Duration,
    /// Run this long before each pause. `None` runs continuously.
    pub stop_interval: Option<Duration>,
    /// Pause this long between runs. Ignored without `stop_interval`.
    pub pause: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Paused,
    Stopped,
}

/// Phase of the cadence at `elapsed` into the window.
pub fn phase_at(elapsed: Duration, cfg: &CadenceConfig) -> Phase {
    if elapsed >= cfg.total {
        return Phase::Stopped;
    }
    let Some(stop_interval) = cfg.stop_interval else {
        return Phase::Running;
    };
    if stop_interval.is_zero() || cfg.pause.is_zero() {
        return Phase::Running;
    }
    let cycle = stop_interval + cfg.pause;
    let pos = Duration::from_nanos((elapsed.as_nanos() % cycle.as_nanos()) as u64);
    if pos < stop_interval {
        Phase::Running
    } else {
        Phase::Paused
    }
}

/// Drive the traffic generator through one iteration window.
///
/// Starts traffic immediately, fires stop/start on phase transitions,
/// and always leaves the generator stopped, whether the window ran to
/// its end or `shutdown` flipped mid-way. Transition failures are
/// logged and the schedule keeps going; a wedged generator should not
/// stall result collection.
pub async fn run<T: TrafficControl>(
    cfg: CadenceConfig,
    traffic: Arc<T>,
    mut shutdown: watch::Receiver<bool>,
) {
    let started = Instant::now();
    let mut phase = Phase::Running;
    if let Err(e) = traffic.start().await {
        tracing::error!(error = %e, "traffic start failed");
    }

    let mut ticker = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::debug!("cadence interrupted by shutdown");
                    break;
                }
                continue;
            }
        }

        let next = phase_at(started.elapsed(), &cfg);
        if next == phase {
            continue;
        }
        match next {
            Phase::Running => {
                tracing::info!("cadence resume");
                if let Err(e) = traffic.start().await {
                    tracing::error!(error = %e, "traffic start failed");
                }
            }
            Phase::Paused => {
                tracing::info!("cadence pause");
                if let Err(e) = traffic.stop().await {
                    tracing::error!(error = %e, "traffic stop failed");
                }
            }
            Phase::Stopped => break,
        }
        phase = next;
    }

    if let Err(e) = traffic.stop().await {
        tracing::error!(error = %e, "traffic stop failed");
    }
}
