//! Batched loading of chunks into a vector index.
//!
//! Chunks are written through a [`BatchSink`] in fixed-size batches so an
//! indexing run stays memory-bounded. The policy is best-effort: a batch
//! that fails to embed or insert is logged and skipped, and the run
//! continues with the next batch. Callers must compare
//! [`IndexReport::expected`] against [`IndexReport::inserted`] to detect
//! partial failure — and must clear or deduplicate the target index before
//! re-running, since inserts are append-only and reruns duplicate entries.

use crate::chunking::LawChunk;
use crate::pipeline::PipelineContext;
use crate::stores::BatchSink;
use crate::types::PipelineError;

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Chunks handed to the loader.
    pub expected: usize,
    /// Chunks actually inserted.
    pub inserted: usize,
    /// Zero-based indices of batches that failed.
    pub failed_batches: Vec<usize>,
}

/// Partitions chunk sequences into fixed-size batches for a [`BatchSink`].
#[derive(Debug, Clone, Copy)]
pub struct IndexLoader {
    batch_size: usize,
}

impl IndexLoader {
    pub fn new(batch_size: usize) -> Result<Self, PipelineError> {
        if batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self { batch_size })
    }

    /// Embed and store `chunks` batch by batch, advancing the progress
    /// counter by each successful batch's length.
    pub async fn embed_and_store(
        &self,
        chunks: Vec<LawChunk>,
        sink: &dyn BatchSink,
        ctx: &PipelineContext,
    ) -> IndexReport {
        let expected = chunks.len();
        let total_batches = expected.div_ceil(self.batch_size);
        let mut report = IndexReport {
            expected,
            ..IndexReport::default()
        };

        for (batch_number, batch) in chunks.chunks(self.batch_size).enumerate() {
            match sink.write(batch.to_vec()).await {
                Ok(inserted) => {
                    report.inserted += inserted;
                    // trust the sink's count, not the batch length, so the
                    // summary agrees with the report on partial inserts
                    ctx.add_chunks_indexed(inserted);
                    tracing::info!(
                        batch = batch_number + 1,
                        total_batches,
                        inserted,
                        "indexed batch"
                    );
                }
                Err(err) => {
                    report.failed_batches.push(batch_number);
                    ctx.add_batches_failed(1);
                    tracing::error!(
                        batch = batch_number + 1,
                        total_batches,
                        error = %err,
                        "skipping failed batch"
                    );
                }
            }
        }

        if report.inserted != report.expected {
            tracing::warn!(
                expected = report.expected,
                inserted = report.inserted,
                "indexing run was partial"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    fn chunk(index: usize) -> LawChunk {
        LawChunk {
            id: format!("chunk-{index}"),
            source: "data/pdfs/BGB.pdf".to_string(),
            page: 0,
            chunk_index: index,
            content: format!("content {index}"),
            token_count: 2,
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batch_sizes: Mutex<Vec<usize>>,
        fail_batches: Vec<usize>,
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn write(&self, batch: Vec<LawChunk>) -> Result<usize, PipelineError> {
            let mut sizes = self.batch_sizes.lock().unwrap();
            let batch_number = sizes.len();
            sizes.push(batch.len());
            if self.fail_batches.contains(&batch_number) {
                return Err(PipelineError::IndexWrite("injected failure".to_string()));
            }
            Ok(batch.len())
        }
    }

    #[tokio::test]
    async fn two_and_a_half_thousand_chunks_make_three_batches() {
        let chunks: Vec<LawChunk> = (0..2500).map(chunk).collect();
        let sink = RecordingSink::default();
        let ctx = PipelineContext::default();

        let report = IndexLoader::new(1000)
            .unwrap()
            .embed_and_store(chunks, &sink, &ctx)
            .await;

        assert_eq!(*sink.batch_sizes.lock().unwrap(), vec![1000, 1000, 500]);
        assert_eq!(report.expected, 2500);
        assert_eq!(report.inserted, 2500);
        assert!(report.failed_batches.is_empty());
        // three progress-advance calls summing to the input size
        assert_eq!(ctx.snapshot().chunks_indexed, 2500);
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_and_run_continues() {
        let chunks: Vec<LawChunk> = (0..2500).map(chunk).collect();
        let sink = RecordingSink {
            fail_batches: vec![1],
            ..RecordingSink::default()
        };
        let ctx = PipelineContext::default();

        let report = IndexLoader::new(1000)
            .unwrap()
            .embed_and_store(chunks, &sink, &ctx)
            .await;

        // all three batches were attempted
        assert_eq!(sink.batch_sizes.lock().unwrap().len(), 3);
        assert_eq!(report.inserted, 1500);
        assert_eq!(report.failed_batches, vec![1]);
        assert_eq!(ctx.snapshot().chunks_indexed, 1500);
        assert_eq!(ctx.snapshot().batches_failed, 1);
    }

    #[tokio::test]
    async fn progress_counter_follows_the_sinks_insert_count() {
        struct ShortfallSink;

        #[async_trait]
        impl BatchSink for ShortfallSink {
            async fn write(&self, batch: Vec<LawChunk>) -> Result<usize, PipelineError> {
                // one chunk per batch silently fails to insert
                Ok(batch.len().saturating_sub(1))
            }
        }

        let chunks: Vec<LawChunk> = (0..30).map(chunk).collect();
        let ctx = PipelineContext::default();
        let report = IndexLoader::new(10)
            .unwrap()
            .embed_and_store(chunks, &ShortfallSink, &ctx)
            .await;

        assert_eq!(report.inserted, 27);
        assert_eq!(ctx.snapshot().chunks_indexed, report.inserted);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            IndexLoader::new(0).unwrap_err(),
            PipelineError::Config(_)
        ));
    }

    #[tokio::test]
    async fn empty_input_produces_empty_report() {
        let sink = RecordingSink::default();
        let ctx = PipelineContext::default();
        let report = IndexLoader::new(10)
            .unwrap()
            .embed_and_store(Vec::new(), &sink, &ctx)
            .await;
        assert_eq!(report.expected, 0);
        assert_eq!(report.inserted, 0);
        assert!(sink.batch_sizes.lock().unwrap().is_empty());
    }
}
