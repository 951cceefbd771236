//! ficfetch: batch downloader for story-conversion API caches.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod formats;
pub mod model;

// Re-exports for CLI and consumers.
pub use fetch::{
    run_batch, ApiClient, ApiClientBuilder, FetchError, FetchOptions, HttpTransport, RunLedger,
    Transport, UnsupportedFilter, DEFAULT_API_BASE,
};
pub use formats::{parse_format, parse_format_list, FormatRequest};
pub use model::{BatchSummary, ResolvedArtifact, RunOutcome, StoryMeta};
