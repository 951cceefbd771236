//! Canonical data model for one fetch run.
//!
//! The resolver produces [ResolvedArtifact]s, the store consumes them, and the
//! runner aggregates per-URL outcomes into a [BatchSummary].

use crate::formats::FormatRequest;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// One downloadable artifact for a (source URL, format) pair, as resolved by
/// the metadata endpoint. The hash is the API-reported content hash; it is
/// never recomputed at resolution time.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub source_url: String,
    pub format: FormatRequest,
    /// Sanitized file name, already suffixed for the format.
    pub file_name: String,
    /// Absolute download URL for the cached bytes.
    pub download_url: String,
    /// Content hash reported by the API, compared against local MD5.
    pub hash: String,
}

/// Story metadata block returned alongside the cache URLs.
///
/// Only the fields the filename template exposes are named; everything else
/// the API sends lands in `extra` and stays addressable as a template token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryMeta {
    pub title: Option<String>,
    pub author: Option<String>,
    pub fandom: Option<String>,
    pub chapters: Option<u64>,
    pub updated: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StoryMeta {
    /// Flatten into template fields. Scalar extras are stringified; nested
    /// values are skipped.
    pub fn template_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        if let Some(ref v) = self.title {
            fields.insert("title".to_string(), v.clone());
        }
        if let Some(ref v) = self.author {
            fields.insert("author".to_string(), v.clone());
        }
        if let Some(ref v) = self.fandom {
            fields.insert("fandom".to_string(), v.clone());
        }
        if let Some(v) = self.chapters {
            fields.insert("chapters".to_string(), v.to_string());
        }
        if let Some(ref v) = self.updated {
            fields.insert("updated".to_string(), v.clone());
        }
        for (key, value) in &self.extra {
            let text = match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                serde_json::Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            if let Some(text) = text {
                fields.entry(key.clone()).or_insert(text);
            }
        }
        fields
    }
}

/// Terminal classification for one URL in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Downloaded,
    SkippedUpToDate,
    FailedUnsupported,
    FailedError,
}

impl RunOutcome {
    /// Whether the outcome counts toward a non-zero exit status.
    pub fn is_failure(self) -> bool {
        matches!(self, RunOutcome::FailedUnsupported | RunOutcome::FailedError)
    }
}

/// Aggregated result of one batch run. URL lists keep input order so the
/// changelog and status output are deterministic.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    /// Trimmed input URLs, duplicates included.
    pub input: Vec<String>,
    /// After first-occurrence dedup.
    pub deduped: Vec<String>,
    /// After diffing against the run ledger: the URLs this run processed.
    pub working: Vec<String>,
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// True when the run stopped early on operator cancellation.
    pub cancelled: bool,
    /// Set when a changelog was requested and written.
    pub changelog_path: Option<PathBuf>,
}

impl BatchSummary {
    /// Process exit status: zero iff every processed URL ended in
    /// Downloaded or SkippedUpToDate.
    pub fn exit_status(&self) -> i32 {
        if self.failed.is_empty() {
            0
        } else {
            1
        }
    }
}
