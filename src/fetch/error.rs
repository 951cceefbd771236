//! Shared error type for the fetch pipeline.
//!
//! Per-URL failures (unsupported URL, exhausted retries) are recovered by the
//! runner: the URL goes to the error ledger and the batch continues. Local
//! I/O failures are fatal and abort the whole batch.

use crate::fetch::client::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the resolver, store, and runner.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote service cannot or will not convert this URL: either a
    /// known-unsupported pattern matched, or the metadata response did not
    /// carry the expected per-format fields. A normal outcome for many
    /// inputs, never a batch abort.
    #[error("Unsupported URL: {url}")]
    UnsupportedUrl { url: String },

    /// Connect/timeout failures that survived the retry budget.
    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Non-success HTTP status after retries (or a non-retryable status).
    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    /// Output directory missing. Fatal: the batch stops rather than silently
    /// dropping files.
    #[error("Output directory does not exist: {path}")]
    OutputDirMissing { path: PathBuf },

    /// Writing a downloaded artifact failed. Fatal.
    #[error("Failed to write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether this error aborts the whole batch (local I/O) as opposed to
    /// failing a single URL.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::OutputDirMissing { .. } | FetchError::FileWrite { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_split_matches_taxonomy() {
        assert!(!FetchError::UnsupportedUrl { url: "u".into() }.is_fatal());
        assert!(!FetchError::HttpStatus {
            status: 503,
            url: "u".into()
        }
        .is_fatal());
        assert!(FetchError::OutputDirMissing {
            path: PathBuf::from("out")
        }
        .is_fatal());
        assert!(FetchError::FileWrite {
            path: PathBuf::from("out/x.epub"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .is_fatal());
    }
}
