//! Failure ledger: an append-only record of media that could not be downloaded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

/// Sink for non-fatal download failures. Shared by concurrent downloads.
pub trait FailureSink: Send + Sync {
    fn record(&self, url: &str, reason: &str);
}

/// Appends one failed URL per line to a file.
pub struct FileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, url: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", url)
    }
}

impl FailureSink for FileLedger {
    fn record(&self, url: &str, reason: &str) {
        warn!("❌ Download failed ({}): {}", reason, url);
        if let Err(e) = self.append(url) {
            warn!("⚠️ Could not append to {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub url: String,
    pub reason: String,
}

/// In-memory ledger, used by tests and to tally a single harvest.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl FailureSink for MemoryLedger {
    fn record(&self, url: &str, reason: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LedgerEntry {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}
