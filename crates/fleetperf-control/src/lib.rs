//! Fleetperf campaign runner library.
//!
//! Exposes the modules so HTTP handlers and the iteration loops are
//! testable without spawning the binary.

pub mod api;
pub mod barrier;
pub mod cadence;
pub mod campaign;
pub mod collector;
pub mod config;
pub mod sampler;
pub mod state;
pub mod traffic;
