//! Behavioral-signal ingestion and scoring service.
//!
//! Estimates how likely a browser session is driven by a human versus an
//! automated agent. An embedded collector reports aggregated interaction
//! metrics (mouse motion, clicks, scrolls, text input, environment
//! fingerprints) keyed by a session cookie; this service buffers a bounded
//! recent history per session and computes a multi-dimensional score on
//! demand.
//!
//! # Features
//!
//! - Per-session ring buffers with background TTL eviction
//! - Typed rule predicates compiled once at startup
//! - Composable scorers: local rule engine, remote batch ML inference
//! - Saturating score merge into `[0.0, 1.0]` per dimension
//! - Optional size-rotating, compressed JSON-Lines dataset sink

pub mod config;
pub mod dataset;
pub mod expr;
pub mod repo;
pub mod ring;
pub mod rules;
pub mod scorers;
pub mod server;
pub mod trace;

pub use config::AppConfig;
pub use repo::TracesRepository;
pub use scorers::{CompositeScorer, RemoteBatchScorer, RulesScorer, Score, TracesScorer};
pub use trace::Trace;
