//! Composite scorer: sequential fan-out with saturating merge.

use super::{merge_saturating, Score, ScoreError, TracesScorer};
use crate::repo::TracesRepository;
use crate::trace::Trace;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Runs each child scorer over the same trace history in order and merges
/// the partial scores with per-step saturation into `[0.0, 1.0]`.
///
/// Scorers run sequentially so composition is deterministic: saturation is
/// not commutative with summation outside the bounds. Any child error
/// aborts the pipeline and is returned to the caller.
pub struct CompositeScorer {
    scorers: Vec<Arc<dyn TracesScorer>>,
    repo: Arc<TracesRepository>,
}

impl CompositeScorer {
    pub fn new(scorers: Vec<Arc<dyn TracesScorer>>, repo: Arc<TracesRepository>) -> Self {
        Self { scorers, repo }
    }

    /// Score one session by token. Fails with [`ScoreError::NotFound`]
    /// when the repository has no traces for it.
    pub async fn score_session(&self, token: &str) -> Result<Score, ScoreError> {
        let traces = self
            .repo
            .get(token)
            .ok_or_else(|| ScoreError::NotFound(token.to_string()))?;

        self.score(&traces).await
    }
}

#[async_trait]
impl TracesScorer for CompositeScorer {
    async fn score(&self, traces: &[Trace]) -> Result<Score, ScoreError> {
        let mut result = Score::new();

        for scorer in &self.scorers {
            let partial = scorer.score(traces).await?;
            debug!(scorer = scorer.name(), dimensions = partial.len(), "scorer complete");
            merge_saturating(&mut result, &partial, 0.0, 1.0);
        }

        Ok(result)
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}
