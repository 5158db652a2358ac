//! End-to-end ingestion run against the configured statute index.
//!
//! Configuration comes from `LEXSMITH_CONFIG` (a YAML/TOML/JSON file) plus
//! `LEXSMITH_*` environment overrides; the OpenAI API key is read from the
//! environment (a `.env` file works) by the rig provider.
//!
//! ```text
//! OPENAI_API_KEY=... cargo run --example statute_pipeline
//! ```

use std::env;

use reqwest::Client;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::providers::openai;
use tracing_subscriber::FmtSubscriber;

use lexsmith::config::SettingsBuilder;
use lexsmith::run_ingestion;
use lexsmith::stores::SqliteChunkStore;
use lexsmith::types::PipelineError;

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    init_tracing();

    let mut builder = SettingsBuilder::new();
    if let Ok(config_path) = env::var("LEXSMITH_CONFIG") {
        builder = builder.with_file(config_path)?;
    }
    let settings = builder.with_env().build()?;

    let client = Client::builder()
        .user_agent("lexsmith-statute-ingestor/0.1")
        .use_rustls_tls()
        .build()?;

    tokio::fs::create_dir_all(&settings.database.persist_directory).await?;
    let db_path = settings.database.persist_directory.join("law_chunks.sqlite");

    let openai_client = openai::Client::from_env();
    let embedding_model = openai_client.embedding_model(openai::TEXT_EMBEDDING_3_SMALL);
    let store = SqliteChunkStore::open(&db_path, &embedding_model).await?;

    let summary = run_ingestion(&settings, &client, &store).await?;

    println!("{summary}");
    println!("  sqlite database   : {}", db_path.display());
    if !summary.is_complete() {
        println!("  note: run was partial; clear the database before retrying");
    }

    Ok(())
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder().with_env_filter("info").finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
