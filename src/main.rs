//! Behavioral-signal scoring service.
//!
//! Ingests collector traces keyed by a session cookie and serves
//! on-demand human/automation scores.

use anyhow::{Context, Result};
use beholder::config::{AppConfig, ScorerKind};
use beholder::dataset::JsonDatasetSink;
use beholder::repo::TracesRepository;
use beholder::rules::load_rules;
use beholder::scorers::{CompositeScorer, RemoteBatchScorer, RulesScorer, TracesScorer};
use beholder::server::{build_router, AppState};
use beholder::trace::metric_env;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "beholder")]
#[command(author, version, about = "Behavioral-signal ingestion and scoring service")]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "/etc/beholder/config.yaml")]
    config: PathBuf,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

/// Timeout for one inference request (original wiring).
const ML_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How long in-flight requests may drain after a shutdown signal.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(&args.config).with_context(|| {
        format!("unable to load configuration from {}", args.config.display())
    })?;

    init_logging(args.json_logs, &config.logger.level);

    // Dataset sink is optional; an unset file disables collection.
    let sink = if config.dataset.file.is_empty() {
        None
    } else {
        let sink = JsonDatasetSink::new(
            &config.dataset.file,
            config.dataset.size,
            config.dataset.amount,
        )
        .with_context(|| format!("unable to open dataset file {}", config.dataset.file))?;
        info!(file = %config.dataset.file, "dataset collection enabled");
        Some(Arc::new(sink))
    };

    let repo = Arc::new(TracesRepository::new(
        config.analysis.traces_length,
        config.analysis.traces_ttl,
    ));
    let reaper = tokio::spawn({
        let repo = Arc::clone(&repo);
        async move { repo.serve().await }
    });

    let env = metric_env();
    let mut scorers: Vec<Arc<dyn TracesScorer>> = Vec::new();
    for scorer in &config.analysis.scorers {
        match scorer.kind {
            ScorerKind::Rules => {
                let rules = load_rules(&scorer.rules, &env)
                    .with_context(|| format!("unable to load rules from {}", scorer.rules))?;
                info!(file = %scorer.rules, rules = rules.len(), "rule set compiled");
                scorers.push(Arc::new(RulesScorer::new(rules, -1.0, 1.0)));
            }
            ScorerKind::Ml => {
                let remote = RemoteBatchScorer::new(&scorer.url, ML_REQUEST_TIMEOUT, &scorer.model)
                    .with_context(|| format!("unable to initialize ML scorer for {}", scorer.url))?;
                info!(url = %scorer.url, model = %scorer.model, "ML scorer configured");
                scorers.push(Arc::new(remote));
            }
        }
    }

    let composite = Arc::new(CompositeScorer::new(scorers, Arc::clone(&repo)));
    let state = AppState::new(
        Arc::clone(&repo),
        composite,
        sink.clone(),
        &config.analysis.token,
    );
    let router = build_router(state, &config.server.static_dir);

    let listener = TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("unable to bind {}", config.server.address))?;
    info!(address = %config.server.address, "server is listening");

    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = drain_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("shutdown signal received");

    let _ = drain_tx.send(());
    match tokio::time::timeout(SHUTDOWN_DEADLINE, server).await {
        Ok(joined) => joined
            .context("server task panicked")?
            .context("server error")?,
        Err(_) => warn!("drain deadline exceeded, abandoning in-flight requests"),
    }

    repo.stop();
    let _ = reaper.await;
    if let Some(sink) = sink {
        sink.close();
    }

    info!("server stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "unable to install interrupt handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "unable to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
