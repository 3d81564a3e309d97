//! Score types and the scorer capability.
//!
//! Every scorer consumes the trace history of one session and produces a
//! [`Score`]: a per-dimension float vector. Scorers compose, since the
//! [`CompositeScorer`] is itself a [`TracesScorer`].

pub mod composite;
pub mod remote;
pub mod rules;

pub use composite::CompositeScorer;
pub use remote::RemoteBatchScorer;
pub use rules::RulesScorer;

use crate::trace::Trace;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// A score vector: dimension name to value. At the pipeline boundary every
/// value lies in `[0.0, 1.0]`; rule deltas inside the pipeline may be
/// negative.
pub type Score = HashMap<String, f32>;

/// Failure modes of the scoring pipeline.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// No traces are recorded for the requested session.
    #[error("no traces recorded for session `{0}`")]
    NotFound(String),
    /// The inference service answered with a non-OK status.
    #[error("inference service returned status {0}")]
    RemoteStatus(reqwest::StatusCode),
    /// The inference request failed in transit or timed out.
    #[error("inference request failed: {0}")]
    Remote(#[from] reqwest::Error),
    /// The inference service answered with a body that is not a score.
    #[error("malformed inference response: {0}")]
    Response(#[from] serde_json::Error),
}

/// The scorer capability: map a session's trace history to a score.
#[async_trait]
pub trait TracesScorer: Send + Sync {
    /// Score the full ring contents of one session, oldest to newest.
    async fn score(&self, traces: &[Trace]) -> Result<Score, ScoreError>;

    /// Scorer name, for logs.
    fn name(&self) -> &'static str;
}

/// Add `delta` into `acc` dimension by dimension, clamping into
/// `[min, max]` after every addition. The per-step clamp matters: with
/// oscillating signs it is not equivalent to summing first and clamping
/// once.
pub(crate) fn merge_saturating(acc: &mut Score, delta: &Score, min: f32, max: f32) {
    for (dimension, d) in delta {
        let slot = acc.entry(dimension.clone()).or_insert(0.0);
        *slot = (*slot + d).clamp(min, max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates_per_dimension() {
        let mut acc = Score::new();
        merge_saturating(&mut acc, &Score::from([("a".into(), 0.3)]), 0.0, 1.0);
        merge_saturating(
            &mut acc,
            &Score::from([("a".into(), 0.4), ("b".into(), 0.2)]),
            0.0,
            1.0,
        );

        assert!((acc["a"] - 0.7).abs() < f32::EPSILON);
        assert!((acc["b"] - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_merge_saturates_each_step() {
        let mut acc = Score::new();
        merge_saturating(&mut acc, &Score::from([("a".into(), 0.8)]), 0.0, 1.0);
        merge_saturating(&mut acc, &Score::from([("a".into(), 0.8)]), 0.0, 1.0);
        assert_eq!(acc["a"], 1.0);

        // Clamping happens after each addition, so a later negative delta
        // subtracts from the bound, not from the raw sum.
        merge_saturating(&mut acc, &Score::from([("a".into(), -0.5)]), 0.0, 1.0);
        assert!((acc["a"] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_merge_respects_lower_bound() {
        let mut acc = Score::new();
        merge_saturating(&mut acc, &Score::from([("a".into(), -2.0)]), -1.0, 1.0);
        assert_eq!(acc["a"], -1.0);

        merge_saturating(&mut acc, &Score::from([("a".into(), -2.0)]), 0.0, 1.0);
        assert_eq!(acc["a"], 0.0);
    }
}
