//! PDF acquisition: refresh-not-merge downloading of the catalogued PDFs.
//!
//! Acquisition clears any stale `*.pdf` files first, then attempts every
//! record independently. A failed record is retried with a fixed delay and,
//! once retries are exhausted, recorded in the report — it never aborts the
//! rest of the batch. Downloads run sequentially; the per-item
//! [`RetryPolicy`] is the contract to keep intact if this is ever
//! parallelized.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tokio::fs;

use crate::catalog::LawRecord;
use crate::pipeline::PipelineContext;
use crate::types::PipelineError;

/// Retry contract for a single PDF download.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts before the download fails.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(5000),
        }
    }
}

/// One record that could not be downloaded.
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub code: String,
    pub message: String,
}

/// Per-record outcomes of one acquisition run.
#[derive(Debug, Default)]
pub struct AcquisitionReport {
    pub downloaded: Vec<PathBuf>,
    pub failures: Vec<DownloadFailure>,
}

/// Replace every filesystem-hostile character with `_`.
///
/// Idempotent: sanitizing twice equals sanitizing once.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Delete all `*.pdf` files in `dir` before a fresh acquisition run.
///
/// A partially-downloaded stale set is never silently mixed with a new one.
/// A missing directory is fine — there is nothing to clear.
pub async fn clear_existing(dir: &Path) -> Result<usize, PipelineError> {
    if !fs::try_exists(dir).await? {
        return Ok(0);
    }
    let mut removed = 0usize;
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pdf") {
            fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    tracing::info!(dir = %dir.display(), removed, "cleared stale PDFs");
    Ok(removed)
}

/// Download one record's PDF into `dir`, retrying per `policy`.
///
/// The body is buffered fully before anything is written, so a failed
/// attempt leaves no partial file behind. After exhausting the attempts the
/// error carries the law code and the last underlying failure.
pub async fn download_one(
    client: &Client,
    record: &LawRecord,
    dir: &Path,
    policy: RetryPolicy,
) -> Result<PathBuf, PipelineError> {
    let target = dir.join(format!("{}.pdf", sanitize_filename(&record.code)));
    let mut last_error = String::new();

    for attempt in 1..=policy.attempts.max(1) {
        match fetch_pdf(client, &record.pdf_url).await {
            Ok(body) => {
                fs::write(&target, &body).await?;
                tracing::info!(code = %record.code, bytes = body.len(), "downloaded PDF");
                return Ok(target);
            }
            Err(err) => {
                last_error = err.to_string();
                tracing::warn!(
                    code = %record.code,
                    attempt,
                    attempts = policy.attempts,
                    error = %last_error,
                    "PDF download attempt failed"
                );
                if attempt < policy.attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(PipelineError::Download {
        code: record.code.clone(),
        message: last_error,
    })
}

async fn fetch_pdf(client: &Client, url: &str) -> Result<Vec<u8>, PipelineError> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Clear the target directory, then attempt every record independently.
///
/// Never fails on partial record failure; per-record outcomes land in the
/// report and the context counters. Only filesystem errors preparing the
/// directory are fatal.
pub async fn acquire_all(
    client: &Client,
    records: &[LawRecord],
    dir: &Path,
    policy: RetryPolicy,
    ctx: &PipelineContext,
) -> Result<AcquisitionReport, PipelineError> {
    clear_existing(dir).await?;
    fs::create_dir_all(dir).await?;

    let mut report = AcquisitionReport::default();
    for record in records {
        match download_one(client, record, dir, policy).await {
            Ok(path) => {
                ctx.add_pdfs_downloaded(1);
                report.downloaded.push(path);
            }
            Err(err) => {
                ctx.add_pdfs_failed(1);
                tracing::error!(code = %record.code, error = %err, "giving up on PDF");
                report.failures.push(DownloadFailure {
                    code: record.code.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        downloaded = report.downloaded.len(),
        failed = report.failures.len(),
        "acquisition run complete"
    );
    Ok(report)
}
