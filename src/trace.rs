//! Session traces and the recognized metric schema.

use crate::expr::{Env, Kind, Value};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// One aggregated measurement reported by the collector for a session:
/// a flat mapping from metric name to scalar value.
///
/// Only the metrics declared in [`metric_env`] participate in rule
/// evaluation; anything else rides through untouched so the dataset sink
/// records exactly what the client sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(pub Map<String, serde_json::Value>);

impl Trace {
    /// Look up a metric as an expression value.
    ///
    /// Conversion follows the JSON shape actually present: whole numbers
    /// become ints, strings and booleans map directly. Absent metrics,
    /// fractional numbers, and structured values yield `None`, which the
    /// rule engine treats as a runtime lookup failure.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.0.get(name)? {
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            _ => None,
        }
    }
}

/// The typed environment for rule compilation: every metric the collector
/// reports, with its declared kind.
pub fn metric_env() -> Env {
    Env::new()
        .with_var("timestamp", Kind::Str)
        // Interaction counters and timing aggregates.
        .with_var("mouseMoves", Kind::Int)
        .with_var("clicks", Kind::Int)
        .with_var("clickTimingMin", Kind::Int)
        .with_var("clickTimingMax", Kind::Int)
        .with_var("clickTimingAvg", Kind::Int)
        .with_var("clickTimingCount", Kind::Int)
        .with_var("scrolls", Kind::Int)
        .with_var("scrollTimingMin", Kind::Int)
        .with_var("scrollTimingMax", Kind::Int)
        .with_var("scrollTimingAvg", Kind::Int)
        .with_var("scrollTimingCount", Kind::Int)
        .with_var("textInputEvents", Kind::Int)
        .with_var("textInputTimingMin", Kind::Int)
        .with_var("textInputTimingMax", Kind::Int)
        .with_var("textInputTimingAvg", Kind::Int)
        .with_var("textInputTimingCount", Kind::Int)
        .with_var("sessionDuration", Kind::Int)
        // Browser and device environment.
        .with_var("userAgent", Kind::Str)
        .with_var("language", Kind::Str)
        .with_var("platform", Kind::Str)
        .with_var("screenWidth", Kind::Int)
        .with_var("screenHeight", Kind::Int)
        .with_var("timezone", Kind::Str)
        .with_var("cookiesEnabled", Kind::Bool)
        .with_var("onLine", Kind::Bool)
        .with_var("deviceMemory", Kind::Int)
        .with_var("maxTouchPoints", Kind::Int)
        .with_var("browserName", Kind::Str)
        .with_var("browserVersion", Kind::Str)
        .with_var("osName", Kind::Str)
        .with_var("osVersion", Kind::Str)
}
