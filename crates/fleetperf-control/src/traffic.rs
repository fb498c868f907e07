//! Background traffic control seam.
//!
//! The cadence loop drives a traffic generator through start/stop
//! cycles. The real implementation talks to the traffic backend over
//! its own API; the campaign only needs the two transitions, so the
//! seam stays minimal and tests substitute a recording fake.

use std::sync::atomic::{AtomicU32, Ordering};

/// Something that can start and stop the background load.
pub trait TrafficControl: Send + Sync + 'static {
    fn start(&self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
    fn stop(&self) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// Traffic control that only logs transitions. Used when the runner is
/// collecting results without a co-located load generator.
#[derive(Default)]
pub struct LogOnlyTraffic {
    starts: AtomicU32,
    stops: AtomicU32,
}

impl LogOnlyTraffic {
    pub fn starts(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    pub fn stops(&self) -> u32 {
        self.stops.load(Ordering::Relaxed)
    }
}

impl TrafficControl for LogOnlyTraffic {
    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::Relaxed);
        tracing::info!("traffic start");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::Relaxed);
        tracing::info!("traffic stop");
        Ok(())
    }
}
