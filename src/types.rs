//! Shared error taxonomy for the ingestion pipeline.
//!
//! Catalog fetch/parse failures are fatal to a run; everything downstream
//! (per-PDF download, per-document cleaning, per-batch index writes) is
//! isolated by the callers and collected into reports instead of being
//! propagated past the batch boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport-level failure while talking to the catalog or PDF host.
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Catalog HTML or a stored catalog file could not be interpreted.
    #[error("parse failure: {0}")]
    Parse(String),

    /// All retry attempts for a single PDF were exhausted.
    #[error("download of '{code}' failed after retries: {message}")]
    Download { code: String, message: String },

    /// A downloaded file could not be read as a PDF document.
    #[error("unable to load PDF {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Embedding or vector-store write failure for one batch.
    #[error("index write failed: {0}")]
    IndexWrite(String),

    /// Tokenizer setup or splitter configuration failure.
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
