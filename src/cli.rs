//! CLI parsing and orchestration. Parses args, merges the config file, runs
//! the batch, and maps outcomes to exit codes.

use crate::config;
use crate::fetch::{
    run_batch, ApiClient, FetchError, FetchOptions, HttpTransport, RunLedger, UnsupportedFilter,
    DEFAULT_API_BASE,
};
use crate::fetch::urlset::DEFAULT_UNSUPPORTED_PATTERNS;
use crate::formats::{parse_format_list, FormatRequest};
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message. Exit 0 is reserved for a fully
/// successful batch and exit 1 for per-URL failures, both reported through
/// the summary rather than this type.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Fetch(#[from] FetchError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 2,
            CliRunError::Fetch(_) => 3,
        }
    }
}

/// Parsed `--format` value. Newtype so clap treats the comma list as one
/// argument instead of repeated occurrences.
#[derive(Debug, Clone)]
pub struct FormatListArg(pub Vec<FormatRequest>);

fn parse_formats_arg(s: &str) -> Result<FormatListArg, String> {
    parse_format_list(s)
        .map(FormatListArg)
        .map_err(|e| e.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "ficfetch")]
#[command(about = "Batch-download cached ebooks (epub, mobi, pdf, html) for story URLs")]
#[command(after_help = "Completed URLs are appended to output.log and failed or unsupported \
URLs to err.log in the ledger directory; both are skipped on the next run until the files are \
cleared. Config file keys (output_dir, api_base_url, user_agent, timeouts, retry settings, \
filename_template, unsupported_patterns, ledger_dir) are documented in the README. CLI flags \
override config.")]
pub struct Args {
    /// Story URL, enclosed in quotes.
    #[arg(short, long)]
    pub url: Option<String>,

    /// Comma-separated list of story URLs, enclosed in quotes.
    #[arg(short, long)]
    pub list_url: Option<String>,

    /// Path to a file with one URL per line.
    #[arg(short, long)]
    pub infile: Option<PathBuf>,

    /// Output directory for downloaded files (default: current directory).
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Formats to download, comma-separated: epub (default), mobi, pdf, html.
    #[arg(long, default_value = "epub", value_parser = parse_formats_arg)]
    pub format: FormatListArg,

    /// Force overwrite of existing files, ignoring the hash check.
    #[arg(long)]
    pub force: bool,

    /// Write a changelog file into the output directory after the run.
    #[arg(long)]
    pub changelog: bool,

    /// Name downloaded files from metadata, e.g. "{title} by {author}".
    #[arg(long)]
    pub filename_template: Option<String>,

    /// List the sites the conversion service supports.
    #[arg(short = 's', long)]
    pub supported_sites: bool,

    /// Show structured logs on stderr for debugging.
    #[arg(short, long)]
    pub debug: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Tag requests so the server returns deterministic fixture responses.
    #[arg(short, long, hide = true)]
    pub automated: bool,
}

const SUPPORTED_SITES: &str = "\
Supported sites:

    - SpaceBattles, SufficientVelocity, QuestionableQuesting (XenForo)
    - FanFiction.net, FictionPress
    - Archive Of Our Own
    - Harry Potter Fanfic Archive
    - AdultFanfiction.org
    - Worm, Ward

Partial support (or not tested recently):

    - XenForo based sites (Bulbagarden Forums, The Fanfiction Forum, Fanfic Paradise)
    - Fiction Alley, Fiction Hunt, The Sugar Quill
    - FanficAuthors, Harry Potter Fanfiction (pre-revival archive)

Report conversion issues for these sites upstream to the API operator.";

/// Collect the raw URL batch from whichever input source was given.
/// Exactly one of --url, --list-url, --infile is required.
fn collect_input_urls(args: &Args) -> Result<Vec<String>, CliRunError> {
    let sources = [
        args.url.is_some(),
        args.list_url.is_some(),
        args.infile.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if sources != 1 {
        return Err(CliRunError::InvalidInput(
            "Provide exactly one input source: --url, --list-url, or --infile.".to_string(),
        ));
    }

    if let Some(ref url) = args.url {
        return Ok(vec![url.clone()]);
    }
    if let Some(ref list) = args.list_url {
        return Ok(list.split(',').map(str::to_string).collect());
    }
    let infile = args.infile.as_ref().expect("one source is present");
    let bytes = std::fs::read(infile).map_err(|e| {
        CliRunError::InvalidInput(format!(
            "Cannot read {}: {}. Please enter a valid file path.",
            infile.display(),
            e
        ))
    })?;
    // Lossy decode: undecodable bytes must not fail the batch.
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

/// Entry point for the CLI. Returns the process exit status, or an error
/// carrying one.
pub fn run(args: &Args) -> Result<i32, CliRunError> {
    if args.debug {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .try_init();
    }

    if args.supported_sites {
        println!("{}", SUPPORTED_SITES);
        return Ok(0);
    }

    let raw_urls = collect_input_urls(args)?;
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let out_dir: PathBuf = args
        .out_dir
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let ledger_dir: PathBuf = config
        .as_ref()
        .and_then(|c| c.ledger_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let api_base_url = config
        .as_ref()
        .and_then(|c| c.api_base_url.clone())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let filename_template = args
        .filename_template
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.filename_template.clone()));

    let mut builder = ApiClient::builder();
    if let Some(ua) = config.as_ref().and_then(|c| c.user_agent.clone()) {
        builder = builder.user_agent(ua);
    }
    if let Some(secs) = config.as_ref().and_then(|c| c.connect_timeout_secs) {
        builder = builder.connect_timeout_secs(secs);
    }
    if let Some(secs) = config.as_ref().and_then(|c| c.read_timeout_secs) {
        builder = builder.read_timeout_secs(secs);
    }
    if let Some(n) = config.as_ref().and_then(|c| c.retry_count) {
        builder = builder.retry_count(n);
    }
    if let Some(backoff) = config.as_ref().and_then(|c| c.retry_backoff_secs.clone()) {
        builder = builder.retry_backoff_secs(backoff);
    }
    if let Some(secs) = config.as_ref().and_then(|c| c.transient_delay_secs) {
        builder = builder.transient_delay_secs(secs);
    }
    let mut client: ApiClient<HttpTransport> = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let mut patterns: Vec<String> = DEFAULT_UNSUPPORTED_PATTERNS.map(String::from).to_vec();
    if let Some(extra) = config.as_ref().and_then(|c| c.unsupported_patterns.clone()) {
        patterns.extend(extra);
    }
    let filter = UnsupportedFilter::from_patterns(&patterns).map_err(CliRunError::InvalidInput)?;

    let ledger = RunLedger::in_dir(&ledger_dir);

    if args.force && !args.quiet {
        eprintln!("WARNING: --force was passed. Files will be overwritten.");
    }

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |done: usize, total: usize, url: &str| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(done as u64);
        pb.set_message(url.to_string());
    };
    let progress: Option<&dyn Fn(usize, usize, &str)> =
        if args.quiet { None } else { Some(&progress_cb) };

    let fetch_options = FetchOptions {
        api_base_url,
        formats: args.format.0.clone(),
        out_dir,
        overwrite: args.force,
        automated: args.automated,
        write_changelog: args.changelog,
        filename_template,
        progress,
        cancel: None,
    };

    let summary = run_batch(&mut client, &ledger, &filter, &raw_urls, &fetch_options)?;

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    if !args.quiet {
        eprintln!(
            "Downloaded {}, up to date {}, failed {}.",
            summary.downloaded.len(),
            summary.skipped.len(),
            summary.failed.len()
        );
        if let Some(ref path) = summary.changelog_path {
            eprintln!("Wrote {}", path.display());
        }
    }
    if !summary.failed.is_empty() {
        eprintln!(
            "Download failed for one or more URLs. Check {} for the list.",
            ledger.error_path().display()
        );
    }
    Ok(summary.exit_status())
}
