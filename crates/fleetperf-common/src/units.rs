//! Tolerant parsing of agent-reported values.
//!
//! Agents report metrics as free text with embedded units ("123.4 Mbps",
//! "114 ms") and occasionally "N/A" or garbage. Report rows must never
//! fail on a single bad value, so parsing degrades to 0.0.

/// Parse the leading numeric token of a text value.
///
/// `"123.4 Mbps"` → `123.4`, `"114 ms"` → `114.0`, `"N/A"` → `0.0`.
pub fn leading_f64(text: &str) -> f64 {
    text.split_whitespace()
        .next()
        .and_then(|tok| tok.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Canonicalize a report source key.
///
/// Agents that cannot use dots in identifiers post IPs with underscore
/// separators (`192_168_1_4`); treat those as equal to the dotted form.
/// Surrounding whitespace is stripped.
pub fn normalize_source_key(key: &str) -> String {
    key.trim().replace('_', ".")
}
