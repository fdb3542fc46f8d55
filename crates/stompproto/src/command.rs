//! Outbound command formatting.
//!
//! The client sends only a handful of text commands back over the feed
//! connection; everything structural goes through the REST API instead.

use crate::parse::GRAPH_PREFIX;

/// Reply to a `ping`.
pub fn pong() -> &'static str {
    "pong"
}

/// Set a control parameter on an instance.
pub fn param_set(label: &str, symbol: &str, value: f64) -> String {
    format!("param_set {GRAPH_PREFIX}{label}/{symbol} {value}")
}

/// Toggle the `:bypass` pseudo-parameter of an instance.
pub fn bypass(label: &str, bypassed: bool) -> String {
    param_set(label, ":bypass", if bypassed { 1.0 } else { 0.0 })
}

/// Move an instance on the host's canvas.
pub fn plugin_pos(label: &str, x: f64, y: f64) -> String {
    format!("plugin_pos {GRAPH_PREFIX}{label} {x} {y}")
}
