//! Prefixed ID generation.
//!
//! Run IDs use a `run_` prefix followed by a UUIDv7 (time-ordered), so a
//! directory of result files sorts by campaign start time and the ID is
//! instantly recognizable in logs.

use uuid::Uuid;

/// Generate a prefixed ID using UUIDv7.
fn prefixed_id(prefix: &str) -> String {
    let id = Uuid::now_v7();
    format!("{}_{}", prefix, id.as_simple())
}

/// Generate a campaign run ID: `run_<uuid7>`
pub fn run_id() -> String {
    prefixed_id("run")
}
