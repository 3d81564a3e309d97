//! HTTP surface: trace ingest, score queries, optional static files.
//!
//! Status mapping follows the ingest/query contract: malformed input and
//! missing tokens are `422`, an unknown session is `404`, and a score that
//! cannot be serialized is `400`. Scorer pipeline failures also map to
//! `404`: "no score" and "not found" are deliberately indistinguishable
//! to callers.

use crate::dataset::JsonDatasetSink;
use crate::repo::TracesRepository;
use crate::scorers::CompositeScorer;
use crate::trace::Trace;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_REQUEST_BYTES: usize = 10 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    repo: Arc<TracesRepository>,
    scorer: Arc<CompositeScorer>,
    sink: Option<Arc<JsonDatasetSink>>,
    token_cookie: String,
}

impl AppState {
    pub fn new(
        repo: Arc<TracesRepository>,
        scorer: Arc<CompositeScorer>,
        sink: Option<Arc<JsonDatasetSink>>,
        token_cookie: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            scorer,
            sink,
            token_cookie: token_cookie.into(),
        }
    }
}

/// Build the API router. `static_dir` mounts a file server under
/// `/static/` when non-empty.
pub fn build_router(state: AppState, static_dir: &str) -> Router {
    let mut router = Router::new()
        .route("/api/v1/traces", post(ingest_trace))
        .route("/api/v1/scores/:token", get(session_score));

    if !static_dir.is_empty() {
        router = router.nest_service("/static", ServeDir::new(static_dir));
    }

    router
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// POST /api/v1/traces: store one reported trace for the session
/// identified by the configured cookie.
async fn ingest_trace(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let trace: Trace = match serde_json::from_slice(&body) {
        Ok(trace) => trace,
        Err(e) => {
            warn!(error = %e, "unparseable trace body");
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
    };

    let token = match session_token(&headers, &state.token_cookie) {
        Some(token) => token,
        None => {
            warn!(cookie = %state.token_cookie, "trace request without session token");
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
    };

    debug!(token = %token, "trace received");

    if let Some(sink) = &state.sink {
        sink.append(&token, &trace);
    }
    state.repo.append(&token, trace);

    StatusCode::OK
}

/// GET /api/v1/scores/:token: compute the score vector for a session.
async fn session_score(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    if token.trim().is_empty() {
        warn!("score request with empty token");
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    match state.scorer.score_session(&token).await {
        Ok(score) => match serde_json::to_vec(&score) {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(e) => {
                warn!(error = %e, "unable to serialize score");
                StatusCode::BAD_REQUEST.into_response()
            }
        },
        Err(e) => {
            warn!(error = %e, token = %token, "score unavailable");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Extract the session token from the named cookie. Empty values count as
/// missing.
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            if let (Some(name), Some(v)) = (parts.next(), parts.next()) {
                if name == cookie_name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_cookie(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(raw).unwrap());
        headers
    }

    #[test]
    fn test_session_token_single_cookie() {
        let headers = headers_with_cookie("sid=abc123");
        assert_eq!(session_token(&headers, "sid"), Some("abc123".into()));
    }

    #[test]
    fn test_session_token_among_many() {
        let headers = headers_with_cookie("theme=dark; sid=abc123; lang=en");
        assert_eq!(session_token(&headers, "sid"), Some("abc123".into()));
    }

    #[test]
    fn test_session_token_missing_or_empty() {
        let headers = headers_with_cookie("other=value");
        assert_eq!(session_token(&headers, "sid"), None);

        let headers = headers_with_cookie("sid=");
        assert_eq!(session_token(&headers, "sid"), None);

        assert_eq!(session_token(&HeaderMap::new(), "sid"), None);
    }

    #[test]
    fn test_session_token_name_is_exact() {
        let headers = headers_with_cookie("sid2=abc");
        assert_eq!(session_token(&headers, "sid"), None);
    }

    #[test]
    fn test_session_token_multiple_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("sid=xyz"));
        assert_eq!(session_token(&headers, "sid"), Some("xyz".into()));
    }
}
