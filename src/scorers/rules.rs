//! Rule-based scorer.

use super::{merge_saturating, Score, ScoreError, TracesScorer};
use crate::rules::Rule;
use crate::trace::Trace;
use async_trait::async_trait;
use tracing::error;

/// Applies an ordered rule set across a session's trace history.
///
/// Every rule is evaluated against every trace in order; matching deltas
/// accumulate per dimension with saturation to `[min, max]` applied after
/// each addition. Rule runtime failures are logged and skipped; this
/// scorer never fails.
pub struct RulesScorer {
    rules: Vec<Rule>,
    min: f32,
    max: f32,
}

impl RulesScorer {
    /// Create a scorer with the given accumulator bounds. Typical bounds
    /// are `(-1.0, 1.0)` so negative evidence can offset positive before
    /// the composite clamps to `[0.0, 1.0]`.
    pub fn new(rules: Vec<Rule>, min: f32, max: f32) -> Self {
        Self { rules, min, max }
    }
}

#[async_trait]
impl TracesScorer for RulesScorer {
    async fn score(&self, traces: &[Trace]) -> Result<Score, ScoreError> {
        let mut score = Score::new();

        for trace in traces {
            for rule in &self.rules {
                match rule.eval(trace) {
                    Ok(Some(delta)) => merge_saturating(&mut score, delta, self.min, self.max),
                    Ok(None) => {}
                    Err(e) => {
                        error!(error = %e, rule = rule.when(), "rule evaluation failed");
                    }
                }
            }
        }

        Ok(score)
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
