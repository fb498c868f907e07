//! Data models for the Fleetperf platform.
//!
//! These types are shared between the control plane (which builds the
//! roster and collects results) and the reporting layer (which consumes
//! frozen per-iteration snapshots).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Device identity ─────────────────────────────────────────────────

/// The canonical identifier the registry assigns to one physical device
/// for the duration of a run.
///
/// All cross-module keying goes through this type; raw port IDs, ADB
/// serials, and IPs are resolved to a `DeviceKey` exactly once, at
/// roster-construction time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key names a wireless interface (e.g. `1.11.wlan0`).
    /// Wireless-interface keys win the duplicate-IP dedup pass.
    pub fn is_wireless(&self) -> bool {
        self.0.contains("wlan")
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operating-system class of a client device, as reported by the
/// resource inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Android,
    Windows,
    MacOs,
    Linux,
}

impl DeviceClass {
    /// Parse the inventory's free-text device-type label. Returns `None`
    /// for classes the platform does not track (virtual stations, APs).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Android" => Some(DeviceClass::Android),
            "Windows" => Some(DeviceClass::Windows),
            "Mac OS" => Some(DeviceClass::MacOs),
            "Linux/Interop" => Some(DeviceClass::Linux),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Android => write!(f, "Android"),
            DeviceClass::Windows => write!(f, "Windows"),
            DeviceClass::MacOs => write!(f, "Mac OS"),
            DeviceClass::Linux => write!(f, "Linux"),
        }
    }
}

/// Canonical identity for one physical client device.
///
/// Built once per run by the registry merge; fields may be filled in as
/// later inventories are merged (first-non-empty-wins) but never
/// overwritten with emptier data. Empty string means "unknown".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub key: DeviceKey,
    pub ip: String,
    pub hostname: String,
    pub mac: String,
    pub ssid: String,
    pub channel: String,
    pub device_type: DeviceClass,
    /// ADB serial, for mobile devices only.
    pub serial: String,
}

// ── Agent reports ───────────────────────────────────────────────────

/// One asynchronous result push from a remote agent.
///
/// Metric values are kept as the agent's raw text (possibly with units
/// embedded); the table projection parses them tolerantly. The last
/// report received for a key within an iteration wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    /// Normalized source key: dotted IP or device serial.
    pub source_key: String,
    pub hostname: String,
    pub download: String,
    pub upload: String,
    pub idle_latency: String,
    pub download_latency: String,
    pub upload_latency: String,
    pub received_at: DateTime<Utc>,
}

// ── Traffic samples ─────────────────────────────────────────────────

/// One observation of a single cross-connect's counters at a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub connection_id: String,
    pub rx_bytes_a: u64,
    pub rx_bytes_b: u64,
    pub drop_pct_a: f64,
    pub drop_pct_b: f64,
    pub rssi: Option<i32>,
}

/// Per-connection mean of a sample series, used for traffic-recording
/// report rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleAggregate {
    pub connection_id: String,
    pub avg_rx_a: f64,
    pub avg_rx_b: f64,
    pub avg_drop_a: f64,
    pub avg_drop_b: f64,
    /// Mean RSSI over the samples that carried one.
    pub avg_rssi: Option<i32>,
}

impl Sample {
    /// Aggregate an ordered sample series into per-connection means.
    /// Connections appear in first-seen order.
    pub fn aggregate(samples: &[Sample]) -> Vec<SampleAggregate> {
        let mut order: Vec<String> = Vec::new();
        let mut buckets: BTreeMap<String, Vec<&Sample>> = BTreeMap::new();
        for s in samples {
            if !buckets.contains_key(&s.connection_id) {
                order.push(s.connection_id.clone());
            }
            buckets.entry(s.connection_id.clone()).or_default().push(s);
        }

        order
            .into_iter()
            .map(|cx| {
                let group = &buckets[&cx];
                let n = group.len() as f64;
                let rssi_vals: Vec<i32> = group.iter().filter_map(|s| s.rssi).collect();
                SampleAggregate {
                    connection_id: cx,
                    avg_rx_a: group.iter().map(|s| s.rx_bytes_a as f64).sum::<f64>() / n,
                    avg_rx_b: group.iter().map(|s| s.rx_bytes_b as f64).sum::<f64>() / n,
                    avg_drop_a: group.iter().map(|s| s.drop_pct_a).sum::<f64>() / n,
                    avg_drop_b: group.iter().map(|s| s.drop_pct_b).sum::<f64>() / n,
                    avg_rssi: if rssi_vals.is_empty() {
                        None
                    } else {
                        Some(
                            (rssi_vals.iter().map(|v| *v as f64).sum::<f64>()
                                / rssi_vals.len() as f64)
                                .round() as i32,
                        )
                    },
                }
            })
            .collect()
    }
}

// ── Iteration snapshots ─────────────────────────────────────────────

/// Why a device has no data in a finalized iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// The agent has reported before but not within this iteration's
    /// window before the barrier timed out.
    Timeout,
    /// No report from this device was ever seen during the run.
    NeverContacted,
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::Timeout => write!(f, "timeout"),
            MissingReason::NeverContacted => write!(f, "never contacted"),
        }
    }
}

/// Outcome for one device in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeviceResult {
    Reported(AgentReport),
    Missing { reason: MissingReason },
}

/// The frozen per-iteration aggregate: one `DeviceResult` per roster
/// device. Built exactly once per iteration, after the barrier resolves;
/// immutable afterward — late reports go to the next iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    iteration: u32,
    results: BTreeMap<DeviceKey, DeviceResult>,
}

impl IterationSnapshot {
    pub fn new(iteration: u32, results: BTreeMap<DeviceKey, DeviceResult>) -> Self {
        Self { iteration, results }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&DeviceResult> {
        self.results.get(key)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Devices that reported within the iteration window.
    pub fn reported(&self) -> impl Iterator<Item = (&DeviceKey, &AgentReport)> {
        self.results.iter().filter_map(|(k, r)| match r {
            DeviceResult::Reported(rep) => Some((k, rep)),
            DeviceResult::Missing { .. } => None,
        })
    }

    /// Devices with no data, with the reason recorded at freeze time.
    pub fn missing(&self) -> impl Iterator<Item = (&DeviceKey, MissingReason)> {
        self.results.iter().filter_map(|(k, r)| match r {
            DeviceResult::Missing { reason } => Some((k, *reason)),
            DeviceResult::Reported(_) => None,
        })
    }
}
