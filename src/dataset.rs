//! Append-only dataset sink for collected traces.
//!
//! Every ingested `(token, trace)` pair is written as one JSON line so the
//! accumulated file doubles as ML training data. The active segment
//! rotates once it exceeds the configured size; rotated segments are
//! gzip-compressed and pruned oldest-first beyond the retention limit.
//!
//! Sink failures never propagate: ingest must keep working when the disk
//! does not.

use crate::trace::Trace;
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Serialize)]
struct DatasetRecord<'a> {
    time: String,
    token: &'a str,
    trace: &'a Trace,
}

struct SinkState {
    writer: BufWriter<File>,
    written: u64,
}

/// Size-rotating JSON-Lines sink.
pub struct JsonDatasetSink {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    state: Mutex<SinkState>,
}

impl JsonDatasetSink {
    /// Open (or create) the dataset at `path`, rotating segments above
    /// `size_mb` megabytes and retaining at most `backups` compressed
    /// segments.
    pub fn new(path: impl Into<PathBuf>, size_mb: u64, backups: usize) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_bytes: size_mb * 1024 * 1024,
            max_backups: backups,
            state: Mutex::new(SinkState {
                writer: BufWriter::new(file),
                written,
            }),
        })
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Record one trace. Errors are logged and swallowed.
    pub fn append(&self, token: &str, trace: &Trace) {
        if let Err(e) = self.try_append(token, trace) {
            warn!(error = %e, path = %self.path.display(), "dataset append failed");
        }
    }

    /// Flush pending content. Call on shutdown.
    pub fn close(&self) {
        if let Err(e) = self.state.lock().writer.flush() {
            warn!(error = %e, path = %self.path.display(), "dataset flush failed");
        }
    }

    fn try_append(&self, token: &str, trace: &Trace) -> io::Result<()> {
        let record = DatasetRecord {
            time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            token,
            trace,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut state = self.state.lock();
        state.writer.write_all(&line)?;
        state.written += line.len() as u64;

        if state.written > self.max_bytes {
            self.rotate(&mut state)?;
        }

        Ok(())
    }

    /// Swap the active segment for a fresh one and hand the old segment to
    /// compression and retention pruning.
    fn rotate(&self, state: &mut SinkState) -> io::Result<()> {
        state.writer.flush()?;

        let backup = self.backup_path();
        fs::rename(&self.path, &backup)?;

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        state.writer = BufWriter::new(file);
        state.written = 0;

        let path = self.path.clone();
        let max_backups = self.max_backups;
        let finish = move || {
            if let Err(e) = compress_segment(&backup) {
                warn!(error = %e, segment = %backup.display(), "segment compression failed");
            }
            if let Err(e) = prune_backups(&path, max_backups) {
                warn!(error = %e, "backup pruning failed");
            }
        };

        // Compress off the request path when a runtime is available.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(finish);
            }
            Err(_) => finish(),
        }

        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");
        let timestamp = Local::now().format("%Y%m%dT%H%M%S%3f");
        let name = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}-{timestamp}.{ext}"),
            None => format!("{stem}-{timestamp}"),
        };
        self.path.with_file_name(name)
    }
}

fn compress_segment(path: &Path) -> io::Result<()> {
    let mut input = File::open(path)?;
    let mut contents = Vec::new();
    input.read_to_end(&mut contents)?;

    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    encoder.write_all(&contents)?;
    encoder.finish()?;

    fs::remove_file(path)
}

/// Remove the oldest rotated segments beyond `max_backups`. Backup names
/// embed a sortable timestamp, so lexicographic order is age order.
fn prune_backups(active: &Path, max_backups: usize) -> io::Result<()> {
    let dir = match active.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
        Some(dir) => dir,
        None => Path::new("."),
    };
    let stem = active
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    let prefix = format!("{stem}-");

    let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .collect();

    backups.sort();
    backups.reverse();
    for old in backups.iter().skip(max_backups) {
        fs::remove_file(old)?;
    }

    Ok(())
}
