//! Projection of a frozen snapshot into report rows.
//!
//! Every iteration yields exactly one row per roster device, in roster
//! order, whether or not the device reported. Downstream rendering
//! (CSV/PDF/graphs) relies on identical row count and order across
//! iterations to compare them directly.

use serde::{Deserialize, Serialize};

use crate::models::{Device, DeviceClass, DeviceKey, DeviceResult, IterationSnapshot};
use crate::units::leading_f64;

/// Whether a row carries real data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "no data")]
    NoData,
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowStatus::Ok => write!(f, "ok"),
            RowStatus::NoData => write!(f, "no data"),
        }
    }
}

/// One report row for one device in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub key: DeviceKey,
    pub hostname: String,
    pub ip: String,
    pub mac: String,
    pub ssid: String,
    pub channel: String,
    pub device_type: DeviceClass,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub idle_latency_ms: f64,
    pub download_latency_ms: f64,
    pub upload_latency_ms: f64,
    pub status: RowStatus,
}

/// The complete, gap-filled row set for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationTable {
    pub iteration: u32,
    pub rows: Vec<TableRow>,
}

impl IterationTable {
    /// Project a roster plus a frozen snapshot into rows.
    ///
    /// `roster` must already be in report order (the registry's
    /// `roster()` output); row order follows it exactly, so it is
    /// identical across iterations of a run.
    pub fn project(roster: &[Device], snapshot: &IterationSnapshot) -> Self {
        let rows = roster
            .iter()
            .map(|dev| match snapshot.get(&dev.key) {
                Some(DeviceResult::Reported(rep)) => TableRow {
                    key: dev.key.clone(),
                    hostname: dev.hostname.clone(),
                    ip: dev.ip.clone(),
                    mac: dev.mac.clone(),
                    ssid: dev.ssid.clone(),
                    channel: dev.channel.clone(),
                    device_type: dev.device_type,
                    download_mbps: leading_f64(&rep.download),
                    upload_mbps: leading_f64(&rep.upload),
                    idle_latency_ms: leading_f64(&rep.idle_latency),
                    download_latency_ms: leading_f64(&rep.download_latency),
                    upload_latency_ms: leading_f64(&rep.upload_latency),
                    status: RowStatus::Ok,
                },
                // Missing from the snapshot entirely is treated the same
                // as an explicit missing marker: a zeroed "no data" row.
                _ => TableRow {
                    key: dev.key.clone(),
                    hostname: dev.hostname.clone(),
                    ip: dev.ip.clone(),
                    mac: dev.mac.clone(),
                    ssid: dev.ssid.clone(),
                    channel: dev.channel.clone(),
                    device_type: dev.device_type,
                    download_mbps: 0.0,
                    upload_mbps: 0.0,
                    idle_latency_ms: 0.0,
                    download_latency_ms: 0.0,
                    upload_latency_ms: 0.0,
                    status: RowStatus::NoData,
                },
            })
            .collect();

        Self {
            iteration: snapshot.iteration(),
            rows,
        }
    }
}
