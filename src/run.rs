use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::browser::wait::Wait;
use crate::browser::{self, Browser};
use crate::extract;
use crate::store::{self, ResultRow};

pub struct RunOptions {
    pub limit: Option<usize>,
    pub strict: bool,
    pub delay: Duration,
    pub wait: Wait,
}

/// Work left for one extraction pass.
#[derive(Debug)]
pub struct Plan {
    /// Previously persisted rows, one per reference.
    pub prior: Vec<ResultRow>,
    /// References not yet in `prior`, in reference-list order.
    pub pending: Vec<String>,
}

#[derive(Debug)]
pub struct RunStats {
    pub pending: usize,
    pub processed: usize,
    pub already_done: usize,
    pub fields_missing: usize,
}

/// Keep the first row for each reference.
pub fn dedup_rows(rows: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut seen = HashSet::new();
    let before = rows.len();
    let rows: Vec<ResultRow> = rows
        .into_iter()
        .filter(|r| seen.insert(r.reference.clone()))
        .collect();
    if rows.len() < before {
        warn!(dropped = before - rows.len(), "Dropped duplicate rows from results dataset");
    }
    rows
}

/// References absent from `prior`, deduplicated, first occurrence kept.
pub fn pending_references(references: &[String], prior: &[ResultRow]) -> Vec<String> {
    let mut done: HashSet<&str> = prior.iter().map(|r| r.reference.as_str()).collect();
    references
        .iter()
        .filter(|r| done.insert(r.as_str()))
        .cloned()
        .collect()
}

pub fn plan(references: &[String], results_path: &Path) -> Result<Plan> {
    let prior = dedup_rows(store::load_results(results_path)?);
    let pending = pending_references(references, &prior);
    info!(
        references = references.len(),
        done = prior.len(),
        pending = pending.len(),
        "Planned extraction"
    );
    Ok(Plan { prior, pending })
}

/// Extract every pending reference, rewriting the dataset after each one.
/// The browser is released on every exit path.
pub async fn execute<B: Browser>(
    browser: &mut B,
    plan: Plan,
    results_path: &Path,
    opts: &RunOptions,
) -> Result<RunStats> {
    let outcome = extract_pending(browser, plan, results_path, opts).await;
    browser::release(browser, outcome).await
}

async fn extract_pending<B: Browser>(
    browser: &mut B,
    plan: Plan,
    results_path: &Path,
    opts: &RunOptions,
) -> Result<RunStats> {
    let Plan { prior, mut pending } = plan;
    if let Some(n) = opts.limit {
        pending.truncate(n);
    }

    let mut stats = RunStats {
        pending: pending.len(),
        processed: 0,
        already_done: prior.len(),
        fields_missing: 0,
    };
    let mut rows = prior;

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (i, reference) in pending.iter().enumerate() {
        let record = extract::extract_record(browser, reference, &opts.wait, opts.strict)
            .await
            .with_context(|| format!("Extraction failed for {reference}"))?;
        stats.fields_missing += record.missing_fields();

        rows.push(ResultRow::from_record(reference.clone(), record));
        store::save_results(results_path, &rows)?;
        stats.processed += 1;
        pb.inc(1);

        if i + 1 < pending.len() {
            tokio::time::sleep(opts.delay).await;
        }
    }

    pb.finish_and_clear();
    info!(
        processed = stats.processed,
        total = rows.len(),
        "Extraction pass finished"
    );
    Ok(stats)
}
