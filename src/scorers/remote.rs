//! Remote ML inference scorer.

use super::{Score, ScoreError, TracesScorer};
use crate::trace::Trace;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct BatchRequest<'a> {
    batch: &'a [Trace],
    model: &'a str,
}

/// Posts a session's trace history to an external inference service and
/// interprets the JSON reply as a score.
///
/// The request body is `{"batch": [trace, ...], "model": "..."}` posted to
/// `{url}/batch`. Any non-OK status, transport failure, or undecodable
/// body is an error for the pipeline to surface; the client-level timeout
/// bounds how long a stuck service can hold up a query.
pub struct RemoteBatchScorer {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl RemoteBatchScorer {
    /// Build a scorer for the service at `url` with a per-request timeout.
    pub fn new(url: &str, timeout: Duration, model: &str) -> Result<Self, ScoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[async_trait]
impl TracesScorer for RemoteBatchScorer {
    async fn score(&self, traces: &[Trace]) -> Result<Score, ScoreError> {
        let request = BatchRequest {
            batch: traces,
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/batch", self.url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ScoreError::RemoteStatus(status));
        }

        let body = response.bytes().await?;
        let score: Score = serde_json::from_slice(&body)?;

        debug!(model = %self.model, batch = traces.len(), "inference complete");
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "ml"
    }
}
