//! SQLite-backed vector store for law chunks, using `sqlite-vec` through
//! `rig-sqlite`.
//!
//! The store is append-only from the pipeline's point of view. Re-running
//! an indexing run against the same database duplicates entries: callers
//! that need safe reruns must delete the database (or its rows) first.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use rig::OneOrMany;
use rig::embeddings::EmbeddingModel;
use rig_sqlite::{Column, ColumnValue, SqliteVectorStore, SqliteVectorStoreTable};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, ffi};

use super::BatchSink;
use crate::chunking::LawChunk;
use crate::types::PipelineError;

/// Row shape of the `law_chunks` table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LawChunkDocument {
    pub id: String,
    pub source: String,
    #[serde(deserialize_with = "deserialize_text_usize")]
    pub page: usize,
    #[serde(deserialize_with = "deserialize_text_usize")]
    pub chunk_index: usize,
    pub content: String,
}

impl From<LawChunk> for LawChunkDocument {
    fn from(chunk: LawChunk) -> Self {
        Self {
            id: chunk.id,
            source: chunk.source,
            page: chunk.page,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
        }
    }
}

impl SqliteVectorStoreTable for LawChunkDocument {
    fn name() -> &'static str {
        "law_chunks"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("source", "TEXT").indexed(),
            Column::new("page", "TEXT"),
            Column::new("chunk_index", "TEXT"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("source", Box::new(self.source.clone())),
            ("page", Box::new(self.page.to_string())),
            ("chunk_index", Box::new(self.chunk_index.to_string())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

// numeric columns are stored as TEXT by the table schema above
fn deserialize_text_usize<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Num(value) => usize::try_from(value)
            .map_err(|_| de::Error::custom(format!("value {value} does not fit in usize"))),
        Repr::Text(text) => text
            .parse::<usize>()
            .map_err(|err| de::Error::custom(format!("unable to parse '{text}': {err}"))),
    }
}

/// Persistent chunk index over sqlite-vec, generic over the embedding model.
#[derive(Clone)]
pub struct SqliteChunkStore<E>
where
    E: EmbeddingModel + 'static,
{
    inner: SqliteVectorStore<E, LawChunkDocument>,
    model: E,
    /// Separate connection handle for direct queries not covered by
    /// rig-sqlite; a clone of the connection the inner store uses.
    conn: Connection,
}

impl<E> SqliteChunkStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    /// Open (or create) the store at `path` and verify the sqlite-vec
    /// extension is loadable.
    pub async fn open(path: impl AsRef<Path>, model: &E) -> Result<Self, PipelineError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;

        let conn_for_queries = conn.clone();
        let store = SqliteVectorStore::new(conn, model)
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;
        Ok(Self {
            inner: store,
            model: model.clone(),
            conn: conn_for_queries,
        })
    }

    /// Embed a batch of chunks and append them to the index.
    pub async fn embed_and_add(&self, chunks: &[LawChunk]) -> Result<usize, PipelineError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self
            .model
            .embed_texts(texts)
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;
        if embeddings.len() != chunks.len() {
            return Err(PipelineError::IndexWrite(format!(
                "embedding count mismatch: {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            rows.push((
                LawChunkDocument::from(chunk.clone()),
                OneOrMany::one(embedding),
            ));
        }
        self.inner
            .add_rows(rows)
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;
        Ok(chunks.len())
    }

    /// Total number of chunks in the store.
    pub async fn count(&self) -> Result<usize, PipelineError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM law_chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))
    }

    /// Cosine-similarity search against a precomputed query embedding.
    ///
    /// Returns the `top_k` most similar chunks with their similarity score.
    pub async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(LawChunkDocument, f32)>, PipelineError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT c.id, c.source, c.page, c.chunk_index, c.content, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) as distance \
                         FROM law_chunks c \
                         JOIN law_chunks_embeddings e ON c.rowid = e.rowid \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&embedding_json], |row| {
                        let document = LawChunkDocument {
                            id: row.get(0)?,
                            source: row.get(1)?,
                            page: row.get::<_, String>(2)?.parse().unwrap_or(0),
                            chunk_index: row.get::<_, String>(3)?.parse().unwrap_or(0),
                            content: row.get(4)?,
                        };
                        let distance: f32 = row.get(5)?;
                        Ok((document, 1.0 - distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| PipelineError::IndexWrite(err.to_string()))
    }

    fn register_sqlite_vec() -> Result<(), PipelineError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(PipelineError::IndexWrite)
    }
}

#[async_trait]
impl<E> BatchSink for SqliteChunkStore<E>
where
    E: EmbeddingModel + Clone + Send + Sync + 'static,
{
    async fn write(&self, batch: Vec<LawChunk>) -> Result<usize, PipelineError> {
        self.embed_and_add(&batch).await
    }
}
