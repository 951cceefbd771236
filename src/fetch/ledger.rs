//! Durable run ledgers: `output.log` for completed URLs, `err.log` for
//! failed or unsupported ones. One URL per line, no escaping.
//!
//! A URL present in either log is excluded from the next run's working set
//! until an operator clears the files. Appends flush immediately so a killed
//! run stays consistent up to the last completed line.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const COMPLETED_LOG: &str = "output.log";
pub const ERROR_LOG: &str = "err.log";

/// Append-only record of per-URL outcomes across runs. Paths are injectable;
/// [RunLedger::in_dir] gives the conventional working-directory layout.
#[derive(Debug, Clone)]
pub struct RunLedger {
    completed_path: PathBuf,
    error_path: PathBuf,
}

impl RunLedger {
    pub fn new(completed_path: PathBuf, error_path: PathBuf) -> Self {
        Self {
            completed_path,
            error_path,
        }
    }

    /// Ledger files in `dir` under their conventional names.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(COMPLETED_LOG), dir.join(ERROR_LOG))
    }

    pub fn completed_path(&self) -> &Path {
        &self.completed_path
    }

    pub fn error_path(&self) -> &Path {
        &self.error_path
    }

    /// Union of both logs. A missing or unreadable file contributes nothing:
    /// corrupt local state fails open instead of blocking the run.
    pub fn load_existing(&self) -> HashSet<String> {
        let mut seen = self.load_completed();
        seen.extend(self.load_errors());
        seen
    }

    /// URLs recorded as successfully resolved and saved.
    pub fn load_completed(&self) -> HashSet<String> {
        read_log(&self.completed_path)
    }

    /// URLs recorded as failed or unsupported.
    pub fn load_errors(&self) -> HashSet<String> {
        read_log(&self.error_path)
    }

    /// Record a successfully resolved and saved URL.
    pub fn append_completed(&self, url: &str) {
        append_line(&self.completed_path, url);
    }

    /// Record a failed or unsupported URL.
    pub fn append_error(&self, url: &str) {
        append_line(&self.error_path, url);
    }
}

/// Read one log into a set, failing open on any error.
fn read_log(path: &Path) -> HashSet<String> {
    let mut seen = HashSet::new();
    match std::fs::read(path) {
        Ok(bytes) => {
            for line in String::from_utf8_lossy(&bytes).lines() {
                let url = line.trim();
                if !url.is_empty() {
                    seen.insert(url.to_string());
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ledger unreadable, treating as empty");
        }
    }
    seen
}

/// Single-line append with an immediate flush. Ledger writes are best-effort:
/// a failure is logged, not propagated, since losing a resume hint must not
/// fail the URL it records.
fn append_line(path: &Path, url: &str) {
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| {
            writeln!(f, "{}", url.trim())?;
            f.flush()
        });
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not append to ledger");
    }
}
