//! Configuration surface for the ingestion pipeline.
//!
//! Settings are resolved in the following order (later wins):
//!
//! 1. Compiled defaults (the public gesetze-im-internet translation index)
//! 2. Config file (`.yaml`/`.yml`, `.toml`, or `.json`, chosen by extension)
//! 3. Environment variables (with `.env` loaded via dotenvy):
//!    `LEXSMITH_URL_BASE`, `LEXSMITH_LAWS_URL`, `LEXSMITH_JSON_FILEPATH`,
//!    `LEXSMITH_PDF_DIR` (sets both the download and the cleaning
//!    directory), `LEXSMITH_PERSIST_DIRECTORY`, `LEXSMITH_RETRY_ATTEMPTS`,
//!    `LEXSMITH_RETRY_DELAY_MS`, `LEXSMITH_CHUNK_SIZE`,
//!    `LEXSMITH_CHUNK_OVERLAP`, `LEXSMITH_BATCH_SIZE`, `LEXSMITH_WORKERS`
//!
//! ## Example
//!
//! ```rust,ignore
//! use lexsmith::config::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new()
//!     .with_file("config.yaml")?
//!     .with_env()
//!     .build()?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Catalog scraping and PDF acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperSettings {
    /// Base URL that PDF links are resolved against.
    pub url_base: String,
    /// Index page listing the translated statutes.
    pub laws_url: String,
    /// Where the parsed catalog is persisted as JSON.
    pub json_filepath: PathBuf,
    /// Directory that acquisition clears and repopulates with PDFs.
    pub pdf_dir: PathBuf,
    /// Download attempts per PDF before giving up.
    pub retry_attempts: u32,
    /// Fixed delay between download attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            url_base: "https://www.gesetze-im-internet.de/".to_string(),
            laws_url: "https://www.gesetze-im-internet.de/Teilliste_translations.html"
                .to_string(),
            json_filepath: PathBuf::from("data/laws.json"),
            pdf_dir: PathBuf::from("data/pdfs"),
            retry_attempts: 3,
            retry_delay_ms: 5000,
        }
    }
}

/// Cleaning and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfProcessingSettings {
    /// Directory the cleaning stage reads PDFs from.
    ///
    /// Normally identical to `scraper.pdf_dir`; kept as a separate knob so
    /// cleaning can run against a pre-existing document set.
    pub pdf_folder_path: PathBuf,
    /// Maximum chunk length, in cl100k_base tokens.
    pub chunk_size: usize,
    /// Trailing tokens repeated at the start of the following chunk.
    pub chunk_overlap: usize,
    /// Chunks per embedding/index batch.
    pub batch_size: usize,
    /// Bounded worker-pool size for PDF load + clean.
    pub workers: usize,
}

impl Default for PdfProcessingSettings {
    fn default() -> Self {
        Self {
            pdf_folder_path: PathBuf::from("data/pdfs"),
            chunk_size: 1000,
            chunk_overlap: 100,
            batch_size: 1000,
            workers: 4,
        }
    }
}

/// Vector index persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Directory holding the persistent vector index.
    pub persist_directory: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            persist_directory: PathBuf::from("data/index"),
        }
    }
}

/// Full configuration consumed by [`crate::pipeline::run_ingestion`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scraper: ScraperSettings,
    pub pdf_processing: PdfProcessingSettings,
    pub database: DatabaseSettings,
}

/// Builder resolving settings from defaults, a file, and the environment.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    base: Settings,
    use_env: bool,
}

impl SettingsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a configuration file, chosen by extension.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("failed to read {}: {err}", path.display()))
        })?;

        let settings: Settings = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|err| PipelineError::Config(format!("invalid YAML config: {err}")))?,
            Some("toml") => toml::from_str(&content)
                .map_err(|err| PipelineError::Config(format!("invalid TOML config: {err}")))?,
            Some("json") => serde_json::from_str(&content)
                .map_err(|err| PipelineError::Config(format!("invalid JSON config: {err}")))?,
            _ => {
                return Err(PipelineError::Config(
                    "config file extension must be .yaml, .yml, .toml, or .json".to_string(),
                ));
            }
        };

        self.base = settings;
        Ok(self)
    }

    /// Enable `LEXSMITH_*` environment overrides (loads `.env` if present).
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Resolve and validate the final settings.
    pub fn build(mut self) -> Result<Settings, PipelineError> {
        if self.use_env {
            dotenvy::dotenv().ok();
            apply_overrides(&mut self.base, |key| std::env::var(key).ok())?;
        }

        validate(&self.base)?;
        Ok(self.base)
    }
}

/// Apply `LEXSMITH_*` overrides from `get` onto `settings`.
///
/// Every public settings field has a key; the lookup is injected so the
/// resolution logic is testable without mutating process environment.
fn apply_overrides(
    settings: &mut Settings,
    get: impl Fn(&str) -> Option<String>,
) -> Result<(), PipelineError> {
    if let Some(url_base) = get("LEXSMITH_URL_BASE") {
        settings.scraper.url_base = url_base;
    }
    if let Some(laws_url) = get("LEXSMITH_LAWS_URL") {
        settings.scraper.laws_url = laws_url;
    }
    if let Some(path) = get("LEXSMITH_JSON_FILEPATH") {
        settings.scraper.json_filepath = PathBuf::from(path);
    }
    if let Some(pdf_dir) = get("LEXSMITH_PDF_DIR") {
        settings.scraper.pdf_dir = PathBuf::from(&pdf_dir);
        settings.pdf_processing.pdf_folder_path = PathBuf::from(pdf_dir);
    }
    if let Some(dir) = get("LEXSMITH_PERSIST_DIRECTORY") {
        settings.database.persist_directory = PathBuf::from(dir);
    }
    if let Some(value) = get("LEXSMITH_RETRY_ATTEMPTS") {
        settings.scraper.retry_attempts = parse_key("LEXSMITH_RETRY_ATTEMPTS", &value)?;
    }
    if let Some(value) = get("LEXSMITH_RETRY_DELAY_MS") {
        settings.scraper.retry_delay_ms = parse_key("LEXSMITH_RETRY_DELAY_MS", &value)?;
    }
    if let Some(value) = get("LEXSMITH_CHUNK_SIZE") {
        settings.pdf_processing.chunk_size = parse_key("LEXSMITH_CHUNK_SIZE", &value)?;
    }
    if let Some(value) = get("LEXSMITH_CHUNK_OVERLAP") {
        settings.pdf_processing.chunk_overlap = parse_key("LEXSMITH_CHUNK_OVERLAP", &value)?;
    }
    if let Some(value) = get("LEXSMITH_BATCH_SIZE") {
        settings.pdf_processing.batch_size = parse_key("LEXSMITH_BATCH_SIZE", &value)?;
    }
    if let Some(value) = get("LEXSMITH_WORKERS") {
        settings.pdf_processing.workers = parse_key("LEXSMITH_WORKERS", &value)?;
    }
    Ok(())
}

fn parse_key<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PipelineError> {
    value.parse().map_err(|_| {
        PipelineError::Config(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

fn validate(settings: &Settings) -> Result<(), PipelineError> {
    if settings.scraper.url_base.is_empty() {
        return Err(PipelineError::Config(
            "scraper.url_base must not be empty".to_string(),
        ));
    }
    if settings.scraper.retry_attempts == 0 {
        return Err(PipelineError::Config(
            "scraper.retry_attempts must be at least 1".to_string(),
        ));
    }
    if settings.pdf_processing.chunk_size == 0 {
        return Err(PipelineError::Config(
            "pdf_processing.chunk_size must be positive".to_string(),
        ));
    }
    if settings.pdf_processing.chunk_overlap >= settings.pdf_processing.chunk_size {
        return Err(PipelineError::Config(
            "pdf_processing.chunk_overlap must be smaller than chunk_size".to_string(),
        ));
    }
    if settings.pdf_processing.batch_size == 0 {
        return Err(PipelineError::Config(
            "pdf_processing.batch_size must be positive".to_string(),
        ));
    }
    if settings.pdf_processing.workers == 0 {
        return Err(PipelineError::Config(
            "pdf_processing.workers must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = SettingsBuilder::new().build().unwrap();
        assert_eq!(settings.scraper.retry_attempts, 3);
        assert_eq!(settings.pdf_processing.batch_size, 1000);
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let mut builder = SettingsBuilder::new();
        builder.base.pdf_processing.chunk_overlap = builder.base.pdf_processing.chunk_size;
        let err = builder.build().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "scraper:\n  url_base: \"https://example.test/\"\npdf_processing:\n  chunk_size: 256\n  chunk_overlap: 32"
        )
        .unwrap();

        let settings = SettingsBuilder::new()
            .with_file(file.path())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(settings.scraper.url_base, "https://example.test/");
        assert_eq!(settings.pdf_processing.chunk_size, 256);
        // untouched sections fall back to defaults
        assert_eq!(settings.pdf_processing.batch_size, 1000);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = SettingsBuilder::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn overrides_cover_every_settings_field() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("LEXSMITH_URL_BASE", "https://example.test/"),
            ("LEXSMITH_LAWS_URL", "https://example.test/list.html"),
            ("LEXSMITH_JSON_FILEPATH", "out/catalog.json"),
            ("LEXSMITH_PDF_DIR", "out/pdfs"),
            ("LEXSMITH_PERSIST_DIRECTORY", "out/index"),
            ("LEXSMITH_RETRY_ATTEMPTS", "5"),
            ("LEXSMITH_RETRY_DELAY_MS", "250"),
            ("LEXSMITH_CHUNK_SIZE", "512"),
            ("LEXSMITH_CHUNK_OVERLAP", "64"),
            ("LEXSMITH_BATCH_SIZE", "200"),
            ("LEXSMITH_WORKERS", "2"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        apply_overrides(&mut settings, |key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.scraper.url_base, "https://example.test/");
        assert_eq!(settings.scraper.laws_url, "https://example.test/list.html");
        assert_eq!(settings.scraper.json_filepath, PathBuf::from("out/catalog.json"));
        assert_eq!(settings.scraper.pdf_dir, PathBuf::from("out/pdfs"));
        // the pdf dir override flows to the cleaning stage as well
        assert_eq!(
            settings.pdf_processing.pdf_folder_path,
            PathBuf::from("out/pdfs")
        );
        assert_eq!(settings.database.persist_directory, PathBuf::from("out/index"));
        assert_eq!(settings.scraper.retry_attempts, 5);
        assert_eq!(settings.scraper.retry_delay_ms, 250);
        assert_eq!(settings.pdf_processing.chunk_size, 512);
        assert_eq!(settings.pdf_processing.chunk_overlap, 64);
        assert_eq!(settings.pdf_processing.batch_size, 200);
        assert_eq!(settings.pdf_processing.workers, 2);
    }

    #[test]
    fn malformed_numeric_override_is_rejected() {
        let mut settings = Settings::default();
        let err = apply_overrides(&mut settings, |key| {
            (key == "LEXSMITH_CHUNK_SIZE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
