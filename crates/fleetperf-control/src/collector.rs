//! Concurrent-safe ingestion store for agent results.
//!
//! Agents on heterogeneous devices push results on their own cadence;
//! the collector is the single concurrently-written structure in the
//! whole runner. The report map is a `DashMap` so a post never blocks a
//! reader beyond the one shard write; validation and normalization all
//! happen before touching the map. Every accepted record is also
//! appended to a JSONL audit log — audit failures are logged and never
//! fail the accept.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetperf_common::models::AgentReport;
use fleetperf_common::units::normalize_source_key;

/// Most recent accepted records kept for `GET /api/recent`.
pub const RECENT_CAP: usize = 200;

/// The wire shape of `POST /api/speedtest`. Agents are sloppy about
/// types (numbers vs. strings), so every field tolerates both.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawReport {
    #[serde(default)]
    pub ip: Option<serde_json::Value>,
    #[serde(default)]
    pub hostname: Option<serde_json::Value>,
    #[serde(default)]
    pub serial: Option<serde_json::Value>,
    #[serde(default)]
    pub device_id: Option<serde_json::Value>,
    #[serde(default)]
    pub download_mbps: Option<serde_json::Value>,
    #[serde(default)]
    pub upload_mbps: Option<serde_json::Value>,
    #[serde(default)]
    pub idle_ms: Option<serde_json::Value>,
    #[serde(default)]
    pub download_latency_ms: Option<serde_json::Value>,
    #[serde(default)]
    pub upload_latency_ms: Option<serde_json::Value>,
}

/// Coerce a JSON scalar to its string form; objects/arrays and absent
/// values become empty.
fn coerce(value: &Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("report carries no ip, device_id, or serial")]
    MissingKey,
}

/// Concurrent store of the latest report per device key.
pub struct Collector {
    reports: DashMap<String, AgentReport>,
    recent: Mutex<VecDeque<AgentReport>>,
    audit: Option<Mutex<File>>,
    audit_path: Option<PathBuf>,
    accepted: AtomicU64,
    started: Instant,
}

impl Collector {
    /// Create a collector. When `audit_path` is set, accepted records
    /// are appended there as one JSON object per line; failure to open
    /// the file disables auditing but not collection.
    pub fn new(audit_path: Option<&Path>) -> Self {
        let audit = audit_path.and_then(|path| {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => Some(Mutex::new(file)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "cannot open audit log, continuing without");
                    None
                }
            }
        });

        Self {
            reports: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAP)),
            audit,
            audit_path: audit_path.map(Path::to_path_buf),
            accepted: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Accept one agent report. The detecting key is the IP when
    /// present, else the device id, else the serial. Later posts for
    /// the same key overwrite earlier ones (last-write-wins).
    pub fn post(&self, raw: &RawReport) -> Result<AgentReport, IngestError> {
        // All parsing happens before the map write.
        let ip = coerce(&raw.ip);
        let key = if !ip.is_empty() {
            ip.clone()
        } else {
            let fallback = coerce(&raw.device_id);
            if !fallback.is_empty() {
                fallback
            } else {
                coerce(&raw.serial)
            }
        };
        if key.is_empty() {
            return Err(IngestError::MissingKey);
        }
        let key = normalize_source_key(&key);

        let or_zero = |v: &Option<serde_json::Value>| {
            let s = coerce(v);
            if s.is_empty() {
                "0".to_string()
            } else {
                s
            }
        };

        let report = AgentReport {
            source_key: key.clone(),
            hostname: coerce(&raw.hostname),
            download: or_zero(&raw.download_mbps),
            upload: or_zero(&raw.upload_mbps),
            idle_latency: or_zero(&raw.idle_ms),
            download_latency: or_zero(&raw.download_latency_ms),
            upload_latency: or_zero(&raw.upload_latency_ms),
            received_at: Utc::now(),
        };

        self.reports.insert(key, report.clone());
        self.accepted.fetch_add(1, Ordering::Relaxed);

        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == RECENT_CAP {
                recent.pop_front();
            }
            recent.push_back(report.clone());
        }

        self.append_audit(&report);

        tracing::debug!(key = %report.source_key, download = %report.download,
            "stored agent report");
        Ok(report)
    }

    fn append_audit(&self, report: &AgentReport) {
        let Some(audit) = &self.audit else { return };
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "audit serialization failed");
                return;
            }
        };
        let mut file = audit.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            let path = self
                .audit_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            tracing::error!(path = %path, error = %e,
                "audit append failed, record kept in memory only");
        }
    }

    /// Latest report for a key, if any. The key is normalized the same
    /// way posts are, so `10_0_0_1` and `10.0.0.1` find the same record.
    pub fn get(&self, key: &str) -> Option<AgentReport> {
        self.reports.get(&normalize_source_key(key)).map(|r| r.clone())
    }

    /// Snapshot copy of the whole map. Writers are only blocked for the
    /// per-shard copy, never for downstream processing.
    pub fn get_all(&self) -> HashMap<String, AgentReport> {
        self.reports
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Most recent `n` accepted records, clamped to `1..=RECENT_CAP`,
    /// newest last.
    pub fn recent(&self, n: usize) -> Vec<AgentReport> {
        let n = n.clamp(1, RECENT_CAP);
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.iter().rev().take(n).rev().cloned().collect()
    }

    /// The single most recently accepted record, if any.
    pub fn last(&self) -> Option<AgentReport> {
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.back().cloned()
    }

    /// Number of records currently held in the recent store (bounded by
    /// `RECENT_CAP`).
    pub fn recent_len(&self) -> usize {
        let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.len()
    }

    /// Total accepted records since startup (not distinct keys).
    pub fn count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn uptime_s(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
