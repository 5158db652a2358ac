//! Vector-index storage for law chunks.
//!
//! The indexer depends only on the [`BatchSink`] seam: one method that
//! embeds and persists a batch of chunks. The concrete adapter is the
//! sqlite-vec backed [`sqlite::SqliteChunkStore`]; other stores can slot in
//! by implementing the trait.

pub mod sqlite;

use async_trait::async_trait;

use crate::chunking::LawChunk;
use crate::types::PipelineError;

pub use sqlite::{LawChunkDocument, SqliteChunkStore};

/// Destination for one embedding/index batch.
///
/// Implementations embed the batch and append it to the index, returning
/// how many chunks were inserted. Writes are append-only from the
/// pipeline's perspective; a failed batch must leave the sink usable for
/// the next one.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn write(&self, batch: Vec<LawChunk>) -> Result<usize, PipelineError>;
}
