//! Fetch orchestration: URL normalization, ledgers, metadata resolution,
//! hash-gated persistence, and the batch runner.

mod client;
mod error;

pub mod ledger;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod urlset;

pub use client::{ApiClient, ApiClientBuilder, HttpTransport, Transport, TransportError, TransportResponse, CLIENT_ID};
pub use error::FetchError;
pub use ledger::RunLedger;
pub use resolver::{apply_template, Resolver};
pub use runner::{run_batch, write_changelog};
pub use store::{ArtifactStore, StoreOutcome};
pub use urlset::{normalize, UnsupportedFilter, UrlBatch};

use crate::formats::FormatRequest;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

/// Default API base URL the CLI targets when the config does not override it.
pub const DEFAULT_API_BASE: &str = "https://fichub.net";

/// Options for one batch run: requested formats, output location, flags, and
/// the optional progress/cancellation hooks supplied by the caller.
pub struct FetchOptions<'a> {
    pub api_base_url: String,
    pub formats: Vec<FormatRequest>,
    pub out_dir: PathBuf,
    /// Re-fetch even when the local file's hash matches.
    pub overwrite: bool,
    /// Tag outbound requests so the server serves deterministic fixtures.
    pub automated: bool,
    pub write_changelog: bool,
    pub filename_template: Option<String>,
    /// Called after each URL reaches a terminal state with
    /// (processed, total, url). Best-effort display only.
    pub progress: Option<&'a dyn Fn(usize, usize, &str)>,
    /// Observed between URLs, never mid-write.
    pub cancel: Option<&'a AtomicBool>,
}

impl FetchOptions<'_> {
    /// Defaults: epub only, current directory, no flags.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            formats: vec![FormatRequest::Epub],
            out_dir: out_dir.into(),
            overwrite: false,
            automated: false,
            write_changelog: false,
            filename_template: None,
            progress: None,
            cancel: None,
        }
    }
}
