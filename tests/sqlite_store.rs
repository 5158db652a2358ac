//! Integration tests for the sqlite-vec chunk store, driven through a
//! deterministic embedding model against a temporary database file.

use rig::embeddings::embedding::{Embedding, EmbeddingError, EmbeddingModel};

use lexsmith::chunking::LawChunk;
use lexsmith::stores::{BatchSink, SqliteChunkStore};

#[derive(Clone)]
struct HashEmbeddingModel;

impl EmbeddingModel for HashEmbeddingModel {
    const MAX_DOCUMENTS: usize = 64;

    type Client = ();

    fn make(_client: &Self::Client, _model: impl Into<String>, _dims: Option<usize>) -> Self {
        HashEmbeddingModel
    }

    fn ndims(&self) -> usize {
        8
    }

    fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> impl std::future::Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send {
        let documents: Vec<String> = texts.into_iter().collect();
        async move {
            Ok(documents
                .into_iter()
                .map(|document| Embedding {
                    vec: hash_to_vec(&document),
                    document,
                })
                .collect())
        }
    }
}

fn hash_to_vec(text: &str) -> Vec<f64> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..8)
        .map(|i| {
            let bits = seed.rotate_left((i * 8) as u32) ^ ((i as u64) << 24);
            (bits as f64) / u32::MAX as f64
        })
        .collect()
}

fn chunk(index: usize, page: usize, content: &str) -> LawChunk {
    LawChunk {
        id: uuid::Uuid::new_v4().to_string(),
        source: "data/pdfs/BGB.pdf".to_string(),
        page,
        chunk_index: index,
        content: content.to_string(),
        token_count: 4,
    }
}

const CONTENTS: [&str; 3] = [
    "The landlord may terminate the tenancy with three months notice.",
    "Whoever unlawfully takes movable property is liable to imprisonment.",
    "Personal data may only be processed with a legal basis.",
];

async fn open_store(dir: &tempfile::TempDir) -> SqliteChunkStore<HashEmbeddingModel> {
    SqliteChunkStore::open(dir.path().join("chunks.sqlite"), &HashEmbeddingModel)
        .await
        .unwrap()
}

#[tokio::test]
async fn count_accumulates_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    assert_eq!(store.count().await.unwrap(), 0);

    let first: Vec<LawChunk> = CONTENTS
        .iter()
        .enumerate()
        .map(|(index, content)| chunk(index, 0, content))
        .collect();
    let inserted = store.write(first).await.unwrap();
    assert_eq!(inserted, 3);

    let second = vec![chunk(3, 1, "A contract requires offer and acceptance.")];
    store.write(second).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 4);
}

#[tokio::test]
async fn search_returns_the_matching_chunk_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let chunks: Vec<LawChunk> = CONTENTS
        .iter()
        .enumerate()
        .map(|(index, content)| chunk(index, index, content))
        .collect();
    store.write(chunks).await.unwrap();

    let query: Vec<f32> = hash_to_vec(CONTENTS[1])
        .into_iter()
        .map(|v| v as f32)
        .collect();
    let results = store.search_similar(&query, 3).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0.content, CONTENTS[1]);
    // page and chunk index survive the text-column round trip
    assert_eq!(results[0].0.page, 1);
    assert_eq!(results[0].0.chunk_index, 1);
    // similarity is descending from the exact match down
    assert!(results[0].1 >= results[1].1);
    assert!(results[1].1 >= results[2].1);
}

#[tokio::test]
async fn rerunning_an_ingestion_duplicates_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    // a rerun regenerates chunks with fresh ids over the same content
    for _ in 0..2 {
        let chunks: Vec<LawChunk> = CONTENTS
            .iter()
            .enumerate()
            .map(|(index, content)| chunk(index, 0, content))
            .collect();
        store.write(chunks).await.unwrap();
    }

    assert_eq!(store.count().await.unwrap(), 6);
}

#[tokio::test]
async fn empty_batch_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    assert_eq!(store.write(Vec::new()).await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
}
