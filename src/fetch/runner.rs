//! Batch driver: normalizes the input, walks each working URL through the
//! unsupported filter, the resolver, and the store, records terminal states
//! in the run ledger, and aggregates the outcome buckets.
//!
//! Per URL the state machine is
//! `pending -> {unsupported, resolving} -> {failed, resolved} ->
//! {skipped, saved, save-failed}`, realized as straight-line control flow.
//! Processing is sequential: one URL's metadata and bytes complete before
//! the next URL starts, so ledger order matches input order.

use crate::fetch::client::{ApiClient, Transport};
use crate::fetch::error::FetchError;
use crate::fetch::ledger::RunLedger;
use crate::fetch::resolver::Resolver;
use crate::fetch::store::{ArtifactStore, StoreOutcome};
use crate::fetch::urlset::{normalize, UnsupportedFilter};
use crate::fetch::FetchOptions;
use crate::model::{BatchSummary, RunOutcome};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Run one batch. Returns the summary for reporting and exit-status
/// decisions; an `Err` is always a fatal local I/O condition that aborted
/// the batch. Per-URL failures land in the summary and the error ledger.
pub fn run_batch<T: Transport>(
    client: &mut ApiClient<T>,
    ledger: &RunLedger,
    filter: &UnsupportedFilter,
    raw_urls: &[String],
    options: &FetchOptions<'_>,
) -> Result<BatchSummary, FetchError> {
    let store = ArtifactStore::new(&options.out_dir, options.overwrite, options.automated);
    store.ensure_out_dir()?;

    let resolver = Resolver::new(
        &options.api_base_url,
        options.automated,
        options.filename_template.clone(),
    );

    let completed = ledger.load_completed();
    let errored = ledger.load_errors();
    let mut recorded = completed.clone();
    recorded.extend(errored.iter().cloned());

    let batch = normalize(raw_urls, &recorded);
    let mut summary = BatchSummary {
        input: batch.input,
        deduped: batch.deduped,
        working: batch.working.clone(),
        ..BatchSummary::default()
    };

    // URLs the completed log already covers need no update this run. URLs in
    // the error log stay excluded until the operator clears it.
    for url in &summary.deduped {
        if completed.contains(url) {
            summary.skipped.push(url.clone());
        }
    }

    let total = batch.working.len();
    let mut done = 0usize;
    for url in &batch.working {
        if let Some(cancel) = options.cancel {
            if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                info!(processed = done, total, "cancelled between URLs");
                summary.cancelled = true;
                break;
            }
        }
        info!(url, "processing");

        let outcome = process_url(client, &resolver, &store, filter, url, options)?;
        match outcome {
            RunOutcome::Downloaded => {
                ledger.append_completed(url);
                summary.downloaded.push(url.clone());
            }
            RunOutcome::SkippedUpToDate => {
                ledger.append_completed(url);
                summary.skipped.push(url.clone());
            }
            RunOutcome::FailedUnsupported | RunOutcome::FailedError => {
                ledger.append_error(url);
                summary.failed.push(url.clone());
            }
        }

        done += 1;
        if let Some(progress) = options.progress {
            progress(done, total, url);
        }
    }

    if options.write_changelog {
        match write_changelog(&summary, &options.out_dir) {
            Ok(path) => summary.changelog_path = Some(path),
            Err(e) => warn!(error = %e, "could not write changelog"),
        }
    }
    Ok(summary)
}

/// Drive one URL to a terminal state. `Err` is reserved for fatal local I/O;
/// everything else folds into a [RunOutcome].
fn process_url<T: Transport>(
    client: &mut ApiClient<T>,
    resolver: &Resolver,
    store: &ArtifactStore,
    filter: &UnsupportedFilter,
    url: &str,
    options: &FetchOptions<'_>,
) -> Result<RunOutcome, FetchError> {
    if filter.is_unsupported(url) {
        warn!(url, "skipping unsupported URL");
        return Ok(RunOutcome::FailedUnsupported);
    }

    let resolution = match resolver.resolve(client, url, &options.formats) {
        Ok(resolution) => resolution,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e @ FetchError::UnsupportedUrl { .. }) => {
            warn!(url, error = %e, "skipping unsupported URL");
            return Ok(RunOutcome::FailedUnsupported);
        }
        Err(e) => {
            warn!(url, error = %e, "metadata resolution failed");
            return Ok(RunOutcome::FailedError);
        }
    };

    if let Some(ref meta) = resolution.meta {
        if let (Some(chapters), Some(updated)) = (meta.chapters, meta.updated.as_deref()) {
            info!(url, chapters, updated, "resolved");
        }
    }

    let mut any_downloaded = false;
    for artifact in &resolution.artifacts {
        match store.persist(client, artifact) {
            Ok(StoreOutcome::Downloaded(_)) => any_downloaded = true,
            Ok(StoreOutcome::SkippedUpToDate(_)) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(url, file = %artifact.file_name, error = %e, "save failed");
                return Ok(RunOutcome::FailedError);
            }
        }
    }
    if any_downloaded {
        Ok(RunOutcome::Downloaded)
    } else {
        Ok(RunOutcome::SkippedUpToDate)
    }
}

/// Write the human-readable changelog: summary counts, then the literal URL
/// list for each pipeline stage.
pub fn write_changelog(summary: &BatchSummary, out_dir: &Path) -> std::io::Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y-%m-%d T%H%M%S");
    let path = out_dir.join(format!("CHANGELOG - {}.txt", timestamp));
    let mut f = std::fs::File::create(&path)?;

    writeln!(f, "# Changelog")?;
    writeln!(f, "Total URLs given as input: {}", summary.input.len())?;
    writeln!(
        f,
        "Total URLs after removing duplicates: {}",
        summary.deduped.len()
    )?;
    writeln!(
        f,
        "Total URLs after comparing with the run ledger: {}",
        summary.working.len()
    )?;
    writeln!(
        f,
        "Total URLs/Files downloaded: {}",
        summary.downloaded.len()
    )?;
    writeln!(
        f,
        "Total URLs causing download errors: {}",
        summary.failed.len()
    )?;
    writeln!(
        f,
        "Total URLs without any updates: {}",
        summary.skipped.len()
    )?;

    let sections: [(&str, &[String]); 6] = [
        ("URLs given as input", &summary.input),
        ("URLs after removing duplicates", &summary.deduped),
        ("URLs after comparing with the run ledger", &summary.working),
        ("URLs/Files downloaded", &summary.downloaded),
        ("URLs causing download errors", &summary.failed),
        ("URLs without any updates", &summary.skipped),
    ];
    for (heading, urls) in sections {
        if urls.is_empty() {
            continue;
        }
        writeln!(f)?;
        writeln!(f, "## {}", heading)?;
        for url in urls {
            writeln!(f, "{}", url)?;
        }
    }
    f.flush()?;
    Ok(path)
}
