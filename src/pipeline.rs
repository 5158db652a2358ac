//! End-to-end orchestration of the ingestion pipeline.
//!
//! The catalog stage is fatal: without a catalog there is nothing to
//! ingest. Every later stage isolates per-item failures, records them in
//! the shared [`PipelineContext`], and keeps going; the terminal
//! [`RunSummary`] puts expected and actually-indexed counts side by side so
//! partial failure is always visible.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::fs;

use crate::acquire::{self, RetryPolicy};
use crate::catalog;
use crate::chunking::TextSplitter;
use crate::cleaning;
use crate::config::Settings;
use crate::indexing::IndexLoader;
use crate::stores::BatchSink;
use crate::types::PipelineError;

#[derive(Debug, Default)]
struct StageCounters {
    records_parsed: AtomicUsize,
    pdfs_downloaded: AtomicUsize,
    pdfs_failed: AtomicUsize,
    pages_cleaned: AtomicUsize,
    documents_cleaned: AtomicUsize,
    documents_failed: AtomicUsize,
    chunks_produced: AtomicUsize,
    chunks_indexed: AtomicUsize,
    batches_failed: AtomicUsize,
}

/// Cloneable handle over the run's shared progress counters.
///
/// Stages increment these atomically; there is no read-modify-write cycle
/// anywhere, so concurrent workers can share one context freely.
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    inner: Arc<StageCounters>,
}

impl PipelineContext {
    pub fn add_records_parsed(&self, n: usize) {
        self.inner.records_parsed.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_pdfs_downloaded(&self, n: usize) {
        self.inner.pdfs_downloaded.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_pdfs_failed(&self, n: usize) {
        self.inner.pdfs_failed.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_pages_cleaned(&self, n: usize) {
        self.inner.pages_cleaned.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_documents_cleaned(&self, n: usize) {
        self.inner.documents_cleaned.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_documents_failed(&self, n: usize) {
        self.inner.documents_failed.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_chunks_produced(&self, n: usize) {
        self.inner.chunks_produced.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_chunks_indexed(&self, n: usize) {
        self.inner.chunks_indexed.fetch_add(n, Ordering::Relaxed);
    }
    pub fn add_batches_failed(&self, n: usize) {
        self.inner.batches_failed.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            records_parsed: self.inner.records_parsed.load(Ordering::Relaxed),
            pdfs_downloaded: self.inner.pdfs_downloaded.load(Ordering::Relaxed),
            pdfs_failed: self.inner.pdfs_failed.load(Ordering::Relaxed),
            pages_cleaned: self.inner.pages_cleaned.load(Ordering::Relaxed),
            documents_cleaned: self.inner.documents_cleaned.load(Ordering::Relaxed),
            documents_failed: self.inner.documents_failed.load(Ordering::Relaxed),
            chunks_produced: self.inner.chunks_produced.load(Ordering::Relaxed),
            chunks_indexed: self.inner.chunks_indexed.load(Ordering::Relaxed),
            batches_failed: self.inner.batches_failed.load(Ordering::Relaxed),
        }
    }
}

/// Terminal per-stage accounting for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records_parsed: usize,
    pub pdfs_downloaded: usize,
    pub pdfs_failed: usize,
    pub pages_cleaned: usize,
    pub documents_cleaned: usize,
    pub documents_failed: usize,
    pub chunks_produced: usize,
    pub chunks_indexed: usize,
    pub batches_failed: usize,
}

impl RunSummary {
    /// True when every produced chunk made it into the index and no stage
    /// recorded a failure.
    pub fn is_complete(&self) -> bool {
        self.pdfs_failed == 0
            && self.documents_failed == 0
            && self.batches_failed == 0
            && self.chunks_indexed == self.chunks_produced
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ingestion summary")?;
        writeln!(f, "  records parsed    : {}", self.records_parsed)?;
        writeln!(
            f,
            "  pdfs downloaded   : {} ({} failed)",
            self.pdfs_downloaded, self.pdfs_failed
        )?;
        writeln!(
            f,
            "  documents cleaned : {} ({} failed, {} pages)",
            self.documents_cleaned, self.documents_failed, self.pages_cleaned
        )?;
        writeln!(f, "  chunks produced   : {}", self.chunks_produced)?;
        write!(
            f,
            "  chunks indexed    : {} ({} batches failed)",
            self.chunks_indexed, self.batches_failed
        )
    }
}

/// Run the full pipeline: catalog → acquire → clean → chunk → index.
///
/// Returns the terminal summary. Only catalog-stage failures (and
/// filesystem failures preparing directories) abort the run; every other
/// failure is isolated, counted, and visible in the summary.
pub async fn run_ingestion(
    settings: &Settings,
    client: &Client,
    sink: &dyn BatchSink,
) -> Result<RunSummary, PipelineError> {
    let ctx = PipelineContext::default();

    tracing::info!(url = %settings.scraper.laws_url, "stage 1/5: fetching law catalog");
    let html = catalog::fetch_catalog_page(client, &settings.scraper.laws_url).await?;
    let records = catalog::parse_catalog(&html, &settings.scraper.url_base);
    if records.is_empty() {
        return Err(PipelineError::Parse(
            "catalog page yielded no law records".to_string(),
        ));
    }
    ctx.add_records_parsed(records.len());
    catalog::persist_catalog(&records, &settings.scraper.json_filepath).await?;

    tracing::info!(records = records.len(), "stage 2/5: acquiring PDFs");
    let policy = RetryPolicy {
        attempts: settings.scraper.retry_attempts,
        delay: Duration::from_millis(settings.scraper.retry_delay_ms),
    };
    acquire::acquire_all(client, &records, &settings.scraper.pdf_dir, policy, &ctx).await?;

    tracing::info!("stage 3/5: cleaning documents");
    let pdf_paths = list_pdfs(&settings.pdf_processing.pdf_folder_path).await?;
    let cleaning_report =
        cleaning::clean_all(pdf_paths, settings.pdf_processing.workers, &ctx).await;

    tracing::info!(
        documents = cleaning_report.documents.len(),
        "stage 4/5: chunking"
    );
    let splitter = TextSplitter::new(
        settings.pdf_processing.chunk_size,
        settings.pdf_processing.chunk_overlap,
        TextSplitter::default_separators(),
    )?;
    let chunks = splitter.split_documents(&cleaning_report.documents);
    ctx.add_chunks_produced(chunks.len());

    tracing::info!(chunks = chunks.len(), "stage 5/5: indexing");
    let loader = IndexLoader::new(settings.pdf_processing.batch_size)?;
    let index_report = loader.embed_and_store(chunks, sink, &ctx).await;
    if !index_report.failed_batches.is_empty() {
        tracing::warn!(
            failed_batches = index_report.failed_batches.len(),
            "some batches were not indexed; rerun requires clearing the index first"
        );
    }

    let summary = ctx.snapshot();
    tracing::info!(complete = summary.is_complete(), "pipeline finished\n{summary}");
    Ok(summary)
}

/// Ordered list of `*.pdf` files in `dir`.
async fn list_pdfs(dir: &std::path::Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pdf") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
