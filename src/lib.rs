//! Ingestion pipeline for German statutory-law PDFs.
//!
//! ```text
//! catalog::fetch_catalog_page ──► parse_catalog ──► Vec<LawRecord> ──► laws.json
//!                                                        │
//!                                                        ▼
//! acquire::acquire_all ──► <pdf_dir>/<code>.pdf   (refresh, per-item retry)
//!                                                        │
//!                                                        ▼
//! cleaning::clean_all ──► CleanedDocument pages   (bounded worker pool)
//!                                                        │
//!                                                        ▼
//! chunking::TextSplitter ──► Vec<LawChunk>        (token-bounded, overlapping)
//!                                                        │
//!                                                        ▼
//! indexing::IndexLoader ──► stores::BatchSink ──► sqlite-vec index
//! ```
//!
//! The catalog stage is fatal on failure; every later stage isolates
//! per-item failures and reports them through [`pipeline::RunSummary`].
//! Index writes are append-only: clear the target database before
//! re-running a full ingestion, or entries will be duplicated.

pub mod acquire;
pub mod catalog;
pub mod chunking;
pub mod cleaning;
pub mod config;
pub mod indexing;
pub mod pipeline;
pub mod stores;
pub mod types;

pub use catalog::LawRecord;
pub use chunking::{LawChunk, TextSplitter};
pub use config::{Settings, SettingsBuilder};
pub use pipeline::{PipelineContext, RunSummary, run_ingestion};
pub use stores::{BatchSink, SqliteChunkStore};
pub use types::PipelineError;
