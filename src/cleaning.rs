//! Text cleaning: per-page PDF loading and boilerplate removal.
//!
//! Every translated statute PDF starts with the catalog page's own
//! translated-title header repeated twice, and every page carries the
//! publisher attribution line plus `Page N of M` pagination markers. The
//! cleaners strip exactly that and nothing else; both passes are no-ops on
//! already-cleaned text.
//!
//! Documents share no mutable state, so the set is cleaned under a bounded
//! worker pool. A malformed PDF fails only its own document: failures are
//! collected into the report while siblings keep running.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::pipeline::PipelineContext;
use crate::types::PipelineError;

/// One page of extracted PDF text with a back-reference to its source file.
#[derive(Debug, Clone)]
pub struct PdfPage {
    pub source: PathBuf,
    pub page_index: usize,
    pub content: String,
}

/// The cleaned, ordered page sequence of one PDF.
#[derive(Debug, Clone)]
pub struct CleanedDocument {
    pub source: PathBuf,
    pub pages: Vec<PdfPage>,
}

/// One document that could not be loaded or cleaned.
#[derive(Debug, Clone)]
pub struct CleaningFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one cleaning run; `documents` is sorted by source path so
/// downstream chunking sees a deterministic order regardless of task
/// completion order.
#[derive(Debug, Default)]
pub struct CleaningReport {
    pub documents: Vec<CleanedDocument>,
    pub failures: Vec<CleaningFailure>,
}

static INTRO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.*?Translations.*?Translations.*?\n)").expect("intro pattern")
});

static ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(Service\s+provided\s+by\s+the\s+Federal\s+Ministry\s+of\s+Justice\s+and\s+the\s+Federal\s+Office\s+of\s+Justice\s+‒\s+www\.gesetze\s*-\s*im\s*-\s*internet\s*\.de)|(Page\s+\d+\s+of\s+\d+)",
    )
    .expect("artifact pattern")
});

/// Extract page-level text from one PDF.
///
/// Extraction is CPU-bound, so it runs on the blocking pool. An unreadable
/// or invalid file yields [`PipelineError::Load`].
pub async fn load_pages(path: &Path) -> Result<Vec<PdfPage>, PipelineError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_pages(&owned))
        .await
        .map_err(|err| PipelineError::Load {
            path: path.to_path_buf(),
            message: format!("extraction task failed: {err}"),
        })?
}

fn extract_pages(path: &Path) -> Result<Vec<PdfPage>, PipelineError> {
    let texts = match pdf_extract::extract_text_by_pages(path) {
        Ok(texts) => texts,
        // pdf-extract chokes on some glyph tables; lopdf gets a second try
        Err(primary) => extract_pages_lopdf(path).map_err(|fallback| PipelineError::Load {
            path: path.to_path_buf(),
            message: format!("{primary}; lopdf fallback: {fallback}"),
        })?,
    };

    if texts.is_empty() {
        return Err(PipelineError::Load {
            path: path.to_path_buf(),
            message: "document contains no pages".to_string(),
        });
    }

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(page_index, content)| PdfPage {
            source: path.to_path_buf(),
            page_index,
            content,
        })
        .collect())
}

fn extract_pages_lopdf(path: &Path) -> Result<Vec<String>, lopdf::Error> {
    let document = lopdf::Document::load(path)?;
    let mut pages = Vec::new();
    for &number in document.get_pages().keys() {
        pages.push(document.extract_text(&[number])?);
    }
    Ok(pages)
}

/// Remove the leading repeated-title boilerplate from the first page.
///
/// Strips the minimal prefix up to and including the second `Translations`
/// marker line, leaving the first line of substantive legal text as the new
/// page start. Applies once, to page index 0 only.
pub fn strip_intro_boilerplate(pages: &mut [PdfPage]) {
    if let Some(first) = pages.first_mut() {
        if let Cow::Owned(stripped) = INTRO_RE.replacen(&first.content, 1, "") {
            first.content = stripped;
        }
    }
}

/// Remove the publisher-attribution header and `Page N of M` markers from
/// every page. Case-insensitive and tolerant of variable internal
/// whitespace; idempotent, since removed text can no longer match.
pub fn strip_recurring_artifacts(pages: &mut [PdfPage]) {
    for page in pages.iter_mut() {
        if let Cow::Owned(cleaned) = ARTIFACT_RE.replace_all(&page.content, "") {
            page.content = cleaned;
        }
    }
}

/// Load and clean a single document: pages → intro strip → artifact strip.
pub async fn clean_one(
    path: &Path,
    ctx: &PipelineContext,
) -> Result<CleanedDocument, PipelineError> {
    let mut pages = load_pages(path).await?;
    strip_intro_boilerplate(&mut pages);
    strip_recurring_artifacts(&mut pages);
    ctx.add_pages_cleaned(pages.len());
    Ok(CleanedDocument {
        source: path.to_path_buf(),
        pages,
    })
}

/// Clean every document under a bounded worker pool.
///
/// Pool size is `workers` (minimum 1). Per-document failures are isolated:
/// they are logged, counted, and collected — a corrupt PDF never cancels its
/// siblings. Progress counters are shared through the cloneable context.
pub async fn clean_all(
    paths: Vec<PathBuf>,
    workers: usize,
    ctx: &PipelineContext,
) -> CleaningReport {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks: JoinSet<(PathBuf, Result<CleanedDocument, PipelineError>)> = JoinSet::new();

    for path in paths {
        let semaphore = semaphore.clone();
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let permit = semaphore.acquire_owned().await;
            if permit.is_err() {
                let err = PipelineError::Load {
                    path: path.clone(),
                    message: "worker pool closed".to_string(),
                };
                return (path, Err(err));
            }
            let result = clean_one(&path, &ctx).await;
            (path, result)
        });
    }

    let mut report = CleaningReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(document))) => {
                ctx.add_documents_cleaned(1);
                report.documents.push(document);
            }
            Ok((path, Err(err))) => {
                ctx.add_documents_failed(1);
                tracing::error!(path = %path.display(), error = %err, "document cleaning failed");
                report.failures.push(CleaningFailure {
                    path,
                    message: err.to_string(),
                });
            }
            Err(join_err) => {
                ctx.add_documents_failed(1);
                tracing::error!(error = %join_err, "cleaning worker panicked");
                report.failures.push(CleaningFailure {
                    path: PathBuf::new(),
                    message: join_err.to_string(),
                });
            }
        }
    }

    // join_next yields in completion order; restore a stable order
    report.documents.sort_by(|a, b| a.source.cmp(&b.source));
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(
        cleaned = report.documents.len(),
        failed = report.failures.len(),
        "cleaning run complete"
    );
    report
}

/// Dump all cleaned page text to one file, for inspection and debugging.
pub async fn dump_cleaned(
    documents: &[CleanedDocument],
    path: &Path,
) -> Result<(), PipelineError> {
    let mut out = String::new();
    for document in documents {
        for page in &document.pages {
            out.push_str(&page.content);
            out.push('\n');
        }
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, out).await?;
    Ok(())
}
