//! Per-session trace storage with TTL-based eviction.
//!
//! Each session token owns a fixed-length ring of its most recent traces.
//! A background reaper drops sessions that have been idle longer than the
//! configured TTL, bounding memory to roughly
//! `sessions x ring length x trace size`.

use crate::ring::RingBuffer;
use crate::trace::Trace;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;

/// When a session's idle clock is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPolicy {
    /// Only on session creation: a long-lived session is evicted after the
    /// TTL even while still reporting (a hard session cap).
    OnCreate,
    /// On every append: a session stays alive as long as it keeps
    /// reporting.
    OnAppend,
}

#[derive(Default)]
struct Inner {
    traces: HashMap<String, Arc<RingBuffer<Trace>>>,
    touched: HashMap<String, Arc<Mutex<Instant>>>,
}

/// Thread-safe store mapping session tokens to their recent traces.
///
/// One readers-writer lock guards both maps. The append fast path only
/// takes the shared lock; the exclusive lock is taken for entry creation
/// (double-checked), for snapshots, and for eviction. The per-session
/// rings are independently thread-safe, so pushes happen outside the map
/// lock.
pub struct TracesRepository {
    length: usize,
    ttl: Duration,
    touch_policy: TouchPolicy,
    reap_interval: Duration,
    inner: RwLock<Inner>,
    stop: watch::Sender<bool>,
}

impl TracesRepository {
    /// Create a repository keeping at most `length` traces per session and
    /// evicting sessions idle for longer than `ttl`. The reaper runs once
    /// a minute and touches on every append unless reconfigured.
    pub fn new(length: usize, ttl: Duration) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            length,
            ttl,
            touch_policy: TouchPolicy::OnAppend,
            reap_interval: Duration::from_secs(60),
            inner: RwLock::new(Inner::default()),
            stop,
        }
    }

    /// Override the reaper cadence.
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Override the idle-clock policy.
    pub fn with_touch_policy(mut self, policy: TouchPolicy) -> Self {
        self.touch_policy = policy;
        self
    }

    /// Append a trace to the session's ring, creating the session on first
    /// contact. Never blocks on I/O.
    pub fn append(&self, token: &str, trace: Trace) {
        let now = Instant::now();

        let existing = {
            let inner = self.inner.read();
            inner.traces.get(token).map(|buffer| {
                (Arc::clone(buffer), inner.touched.get(token).cloned())
            })
        };

        let buffer = match existing {
            Some((buffer, touched)) => {
                if self.touch_policy == TouchPolicy::OnAppend {
                    if let Some(cell) = touched {
                        *cell.lock() = now;
                    }
                }
                buffer
            }
            None => {
                // Promote to the exclusive lock; another appender may have
                // created the entry since the read above.
                let mut inner = self.inner.write();
                let touched = Arc::clone(
                    inner
                        .touched
                        .entry(token.to_string())
                        .or_insert_with(|| Arc::new(Mutex::new(now))),
                );
                if self.touch_policy == TouchPolicy::OnAppend {
                    *touched.lock() = now;
                }
                Arc::clone(
                    inner
                        .traces
                        .entry(token.to_string())
                        .or_insert_with(|| Arc::new(RingBuffer::new(self.length))),
                )
            }
        };

        buffer.push(trace);
    }

    /// Snapshot of the session's traces, oldest to newest, or `None` for
    /// an unknown token.
    pub fn get(&self, token: &str) -> Option<Vec<Trace>> {
        let inner = self.inner.write();
        inner.traces.get(token).map(|buffer| buffer.snapshot())
    }

    /// Run the reaper until [`stop`](Self::stop) is called. Scans under
    /// the shared lock, deletes under the exclusive lock; an append
    /// landing between the two simply recreates its session on the next
    /// report.
    pub async fn serve(&self) {
        let mut stop = self.stop.subscribe();
        let start = tokio::time::Instant::now() + self.reap_interval;
        let mut ticker = tokio::time::interval_at(start, self.reap_interval);

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.reap(),
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Signal the reaper to exit. Idempotent; safe before or after
    /// [`serve`](Self::serve) has started.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    fn reap(&self) {
        let now = Instant::now();
        let expired: Vec<String> = {
            let inner = self.inner.read();
            inner
                .touched
                .iter()
                .filter(|(_, touched)| now.duration_since(*touched.lock()) > self.ttl)
                .map(|(token, _)| token.clone())
                .collect()
        };

        if expired.is_empty() {
            return;
        }

        let mut inner = self.inner.write();
        for token in &expired {
            inner.traces.remove(token);
            inner.touched.remove(token);
        }
        debug!(sessions = expired.len(), "evicted idle sessions");
    }
}
