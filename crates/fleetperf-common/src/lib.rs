//! Shared types for the Fleetperf platform.
//!
//! This crate contains:
//! - **Data models** — Device, AgentReport, Sample, IterationSnapshot types
//! - **Inventory mirrors** — serde views of the three device inventories
//! - **DeviceRegistry** — the canonical roster built by merging inventories
//! - **Table projection** — per-iteration, gap-filled report row sets
//! - **ID generation** — prefixed UUIDv7 helpers (`run_`)

pub mod ids;
pub mod inventory;
pub mod models;
pub mod registry;
pub mod table;
pub mod units;
