//! Integration tests for the behavioral scoring service.
//!
//! These boot the full HTTP stack on an ephemeral port and drive it the
//! way the in-page collector does: cookie-identified trace posts followed
//! by score reads.

use axum::{routing::post, Json, Router};
use beholder::dataset::JsonDatasetSink;
use beholder::repo::TracesRepository;
use beholder::rules::parse_rules;
use beholder::scorers::{CompositeScorer, RemoteBatchScorer, RulesScorer, TracesScorer};
use beholder::server::{build_router, AppState};
use beholder::trace::metric_env;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TOKEN_COOKIE: &str = "sid";

struct App {
    base: String,
    client: reqwest::Client,
}

impl App {
    async fn post_trace(&self, cookie: Option<&str>, body: &str) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/api/v1/traces", self.base))
            .header("Content-Type", "application/json")
            .body(body.to_string());
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }
        request.send().await.unwrap()
    }

    async fn get_score(&self, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/api/v1/scores/{token}", self.base))
            .send()
            .await
            .unwrap()
    }
}

async fn spawn_app(state: AppState, static_dir: &str) -> App {
    let router = build_router(state, static_dir);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    App {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
    }
}

fn rules_scorer(yaml: &str) -> Arc<dyn TracesScorer> {
    let rules = parse_rules(yaml, &metric_env()).unwrap();
    Arc::new(RulesScorer::new(rules, -1.0, 1.0))
}

fn app_state(
    repo: Arc<TracesRepository>,
    scorers: Vec<Arc<dyn TracesScorer>>,
    sink: Option<Arc<JsonDatasetSink>>,
) -> AppState {
    let composite = Arc::new(CompositeScorer::new(scorers, Arc::clone(&repo)));
    AppState::new(repo, composite, sink, TOKEN_COOKIE)
}

async fn score_body(response: reqwest::Response) -> HashMap<String, f32> {
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

// =============================================================================
// Ingest + query round trips
// =============================================================================

#[tokio::test]
async fn test_empty_rule_set_yields_empty_score() {
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer("[]")], None), "").await;

    let response = app
        .post_trace(Some("sid=abc"), &json!({"mouseMoves": 10}).to_string())
        .await;
    assert_eq!(response.status(), 200);

    let score = score_body(app.get_score("abc").await).await;
    assert!(score.is_empty());
}

#[tokio::test]
async fn test_rule_deltas_accumulate_across_ring() {
    let yaml = "- when: \"mouseMoves > 5\"\n  then:\n    behavior: 0.5\n";
    let repo = Arc::new(TracesRepository::new(2, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer(yaml)], None), "").await;

    for _ in 0..2 {
        let response = app
            .post_trace(Some("sid=abc"), &json!({"mouseMoves": 10}).to_string())
            .await;
        assert_eq!(response.status(), 200);
    }

    let score = score_body(app.get_score("abc").await).await;
    assert_eq!(score["behavior"], 1.0);
}

#[tokio::test]
async fn test_scores_saturate_at_one() {
    let yaml = "\
- when: \"mouseMoves > 5\"
  then:
    behavior: 0.8
- when: \"mouseMoves > 5\"
  then:
    behavior: 0.8
";
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer(yaml)], None), "").await;

    for _ in 0..2 {
        app.post_trace(Some("sid=abc"), &json!({"mouseMoves": 10}).to_string())
            .await;
    }

    let score = score_body(app.get_score("abc").await).await;
    assert_eq!(score["behavior"], 1.0);
}

#[tokio::test]
async fn test_ring_keeps_newest_traces_only() {
    let yaml = "- when: \"clicks > 0\"\n  then:\n    active: 0.25\n";
    let repo = Arc::new(TracesRepository::new(2, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer(yaml)], None), "").await;

    // Five matching posts, but only the newest two stay in the ring.
    for _ in 0..5 {
        app.post_trace(Some("sid=abc"), &json!({"clicks": 3}).to_string())
            .await;
    }

    let score = score_body(app.get_score("abc").await).await;
    assert!((score["active"] - 0.5).abs() < f32::EPSILON);
}

// =============================================================================
// Error mapping
// =============================================================================

#[tokio::test]
async fn test_missing_token_cookie_is_422_and_stateless() {
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer("[]")], None), "").await;

    let response = app
        .post_trace(None, &json!({"mouseMoves": 10}).to_string())
        .await;
    assert_eq!(response.status(), 422);

    let response = app
        .post_trace(Some("other=abc"), &json!({"mouseMoves": 10}).to_string())
        .await;
    assert_eq!(response.status(), 422);

    // No session was created by the rejected posts.
    assert_eq!(app.get_score("abc").await.status(), 404);
}

#[tokio::test]
async fn test_malformed_body_is_422() {
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer("[]")], None), "").await;

    assert_eq!(app.post_trace(Some("sid=abc"), "").await.status(), 422);
    assert_eq!(app.post_trace(Some("sid=abc"), "{not json").await.status(), 422);
    assert_eq!(app.post_trace(Some("sid=abc"), "[1, 2]").await.status(), 422);
}

#[tokio::test]
async fn test_unknown_token_is_404_without_body() {
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer("[]")], None), "").await;

    let response = app.get_score("ghost").await;
    assert_eq!(response.status(), 404);
    assert!(response.bytes().await.unwrap().is_empty());
}

// =============================================================================
// Session eviction
// =============================================================================

#[tokio::test]
async fn test_idle_session_is_reaped_then_404() {
    let repo = Arc::new(
        TracesRepository::new(10, Duration::from_millis(50))
            .with_reap_interval(Duration::from_millis(20)),
    );
    let reaper = {
        let repo = Arc::clone(&repo);
        tokio::spawn(async move { repo.serve().await })
    };

    let app = spawn_app(
        app_state(Arc::clone(&repo), vec![rules_scorer("[]")], None),
        "",
    )
    .await;

    app.post_trace(Some("sid=abc"), &json!({"mouseMoves": 1}).to_string())
        .await;
    assert_eq!(app.get_score("abc").await.status(), 200);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.get_score("abc").await.status(), 404);

    repo.stop();
    reaper.await.unwrap();
}

// =============================================================================
// Remote inference
// =============================================================================

async fn spawn_inference_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_composite_merges_rules_and_ml() {
    let stub = spawn_inference_stub(Router::new().route(
        "/batch",
        post(|Json(body): Json<serde_json::Value>| async move {
            assert_eq!(body["model"], "movement-v2");
            assert!(body["batch"].is_array());
            Json(json!({"automation": 0.4}))
        }),
    ))
    .await;

    let yaml = "- when: \"mouseMoves > 5\"\n  then:\n    automation: 0.3\n    human: 0.2\n";
    let ml: Arc<dyn TracesScorer> = Arc::new(
        RemoteBatchScorer::new(&stub, Duration::from_secs(5), "movement-v2").unwrap(),
    );

    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(
        app_state(repo, vec![rules_scorer(yaml), ml], None),
        "",
    )
    .await;

    app.post_trace(Some("sid=abc"), &json!({"mouseMoves": 10}).to_string())
        .await;

    let score = score_body(app.get_score("abc").await).await;
    assert!((score["automation"] - 0.7).abs() < 1e-6);
    assert!((score["human"] - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn test_inference_failure_maps_to_404() {
    let stub = spawn_inference_stub(Router::new().route(
        "/batch",
        post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "down") }),
    ))
    .await;

    let ml: Arc<dyn TracesScorer> =
        Arc::new(RemoteBatchScorer::new(&stub, Duration::from_secs(5), "m").unwrap());
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![ml], None), "").await;

    app.post_trace(Some("sid=abc"), &json!({"mouseMoves": 1}).to_string())
        .await;

    // Legacy contract: a failed pipeline is indistinguishable from an
    // unknown session.
    assert_eq!(app.get_score("abc").await.status(), 404);
}

// =============================================================================
// Dataset sink
// =============================================================================

#[tokio::test]
async fn test_ingest_feeds_dataset_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.jsonl");
    let sink = Arc::new(JsonDatasetSink::new(&path, 100, 5).unwrap());

    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(
        app_state(repo, vec![rules_scorer("[]")], Some(Arc::clone(&sink))),
        "",
    )
    .await;

    app.post_trace(Some("sid=abc"), &json!({"mouseMoves": 1}).to_string())
        .await;
    app.post_trace(Some("sid=def"), &json!({"clicks": 2, "custom": "x"}).to_string())
        .await;
    sink.close();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["token"], "abc");
    assert_eq!(first["trace"]["mouseMoves"], 1);
    assert!(first["time"].is_string());

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["token"], "def");
    // Fields outside the metric schema ride through verbatim.
    assert_eq!(second["trace"]["custom"], "x");
}

#[tokio::test]
async fn test_rejected_ingest_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.jsonl");
    let sink = Arc::new(JsonDatasetSink::new(&path, 100, 5).unwrap());

    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(
        app_state(repo, vec![rules_scorer("[]")], Some(Arc::clone(&sink))),
        "",
    )
    .await;

    app.post_trace(None, &json!({"mouseMoves": 1}).to_string()).await;
    app.post_trace(Some("sid=abc"), "{broken").await;
    sink.close();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
}

// =============================================================================
// Static files
// =============================================================================

#[tokio::test]
async fn test_static_directory_is_served_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("collector.js"), "console.log('hi')").unwrap();

    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(
        app_state(repo, vec![rules_scorer("[]")], None),
        dir.path().to_str().unwrap(),
    )
    .await;

    let response = app
        .client
        .get(format!("{}/static/collector.js", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "console.log('hi')");
}

#[tokio::test]
async fn test_static_disabled_without_directory() {
    let repo = Arc::new(TracesRepository::new(10, Duration::from_secs(60)));
    let app = spawn_app(app_state(repo, vec![rules_scorer("[]")], None), "").await;

    let response = app
        .client
        .get(format!("{}/static/collector.js", app.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
