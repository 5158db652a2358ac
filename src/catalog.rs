//! Catalog acquisition: fetching and parsing the published index of laws.
//!
//! The catalog page lists every translated statute as a `<p>` entry whose
//! `<a>` child carries the act abbreviation and a relative link, with an
//! `<abbr title>` holding the human-readable title. Parsing turns that page
//! into an ordered [`LawRecord`] sequence which is persisted to a JSON file
//! and reloaded by later pipeline runs.

use std::path::Path;
use std::sync::LazyLock;

use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::types::PipelineError;

/// One entry of the law catalog.
///
/// Serialized field names match the external catalog-file format consumed by
/// downstream tooling, so they are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawRecord {
    /// Short act abbreviation, e.g. `BGB`.
    #[serde(rename = "Law code")]
    pub code: String,
    /// Human-readable title; may be empty for non-law rows that survived the
    /// header skip (see [`parse_catalog`]).
    #[serde(rename = "Law Title")]
    pub title: String,
    /// Raw relative link to the law's detail page.
    #[serde(rename = "Link")]
    pub source_link: String,
    /// Absolute URL of the downloadable PDF.
    #[serde(rename = "pdf_url")]
    pub pdf_url: String,
}

static P_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("static selector"));
static A_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));
static ABBR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("abbr").expect("static selector"));

/// Fetch the raw catalog page.
///
/// Fails on transport errors and non-2xx statuses. There is no retry at this
/// layer: without a catalog there is no pipeline, so the failure propagates.
pub async fn fetch_catalog_page(client: &Client, url: &str) -> Result<String, PipelineError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let body = response.text().await?;
    tracing::info!(url, bytes = body.len(), "fetched catalog page");
    Ok(body)
}

/// Parse catalog HTML into an ordered sequence of [`LawRecord`]s.
///
/// An entry is included only if its anchor has a non-empty href and
/// non-empty visible text. The first two entries with an empty title are
/// skipped: the source page places exactly two decorative header rows before
/// the real content. That rule is a page-specific workaround, not a general
/// law — keep it literal and re-verify the page format before changing it.
/// Every later empty-title entry is kept as a genuine record.
pub fn parse_catalog(html: &str, url_base: &str) -> Vec<LawRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();
    let mut empty_title_skips = 0usize;

    for paragraph in document.select(&P_SELECTOR) {
        let Some(anchor) = paragraph.select(&A_SELECTOR).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let code = anchor.text().collect::<String>();
        let code = code.trim();
        if href.is_empty() || code.is_empty() {
            continue;
        }

        let title = paragraph
            .select(&ABBR_SELECTOR)
            .next()
            .and_then(|abbr| abbr.value().attr("title"))
            .unwrap_or_default()
            .to_string();

        if title.is_empty() && empty_title_skips < 2 {
            empty_title_skips += 1;
            continue;
        }

        records.push(LawRecord {
            code: code.to_string(),
            title,
            source_link: href.to_string(),
            pdf_url: pdf_url_for(url_base, href),
        });
    }

    tracing::info!(count = records.len(), "parsed law records from catalog");
    records
}

/// Derive the PDF URL from the first path segment of the raw relative link.
///
/// `pdf_url == url_base + seg + "/" + seg + ".pdf"` — a pure function of the
/// base URL and the link.
fn pdf_url_for(url_base: &str, link: &str) -> String {
    let segment = link.split('/').next().unwrap_or_default();
    format!("{url_base}{segment}/{segment}.pdf")
}

/// Write the full ordered catalog to a JSON file, creating parent
/// directories as needed. Any prior catalog at that path is overwritten
/// (refresh semantics, not append).
pub async fn persist_catalog(records: &[LawRecord], path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let serialized = serde_json::to_string_pretty(records)
        .map_err(|err| PipelineError::Parse(err.to_string()))?;
    fs::write(path, serialized).await?;
    tracing::info!(path = %path.display(), count = records.len(), "catalog persisted");
    Ok(())
}

/// Load a previously persisted catalog.
pub async fn load_catalog(path: &Path) -> Result<Vec<LawRecord>, PipelineError> {
    let data = fs::read_to_string(path).await?;
    let records = serde_json::from_str(&data).map_err(|err| {
        PipelineError::Parse(format!("malformed catalog at {}: {err}", path.display()))
    })?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.gesetze-im-internet.de/";

    fn entry(code: &str, link: &str, title: Option<&str>) -> String {
        match title {
            Some(title) => format!(
                "<p><a href=\"{link}\">{code}</a> <abbr title=\"{title}\">{code}</abbr></p>"
            ),
            None => format!("<p><a href=\"{link}\">{code}</a></p>"),
        }
    }

    #[test]
    fn skips_exactly_first_two_empty_title_entries() {
        let html = format!(
            "<html><body>{}{}{}{}{}</body></html>",
            entry("Hdr1", "x/index.html", None),
            entry("Hdr2", "y/index.html", None),
            entry("BGB", "englisch_bgb/index.html", Some("Civil Code")),
            entry("Orphan", "z/index.html", None),
            entry("StGB", "englisch_stgb/index.html", Some("Criminal Code")),
        );
        let records = parse_catalog(&html, BASE);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].code, "BGB");
        // the third empty-title entry is treated as a genuine record
        assert_eq!(records[1].code, "Orphan");
        assert_eq!(records[1].title, "");
        assert_eq!(records[2].code, "StGB");
    }

    #[test]
    fn five_entries_with_two_empty_titles_yield_three_records() {
        let html = format!(
            "{}{}{}{}{}",
            entry("A", "a/index.html", None),
            entry("B", "b/index.html", None),
            entry("C", "c/index.html", Some("Third")),
            entry("D", "d/index.html", Some("Fourth")),
            entry("E", "e/index.html", Some("Fifth")),
        );
        assert_eq!(parse_catalog(&html, BASE).len(), 3);
    }

    #[test]
    fn pdf_url_is_derived_from_first_path_segment() {
        let html = entry("BGB", "englisch_bgb/index.html", Some("Civil Code"));
        let records = parse_catalog(&html, BASE);
        assert_eq!(
            records[0].pdf_url,
            "https://www.gesetze-im-internet.de/englisch_bgb/englisch_bgb.pdf"
        );
    }

    #[test]
    fn anchors_without_href_or_text_are_ignored() {
        let html = "<p><a href=\"\">Empty</a></p><p><a href=\"x/y\">   </a></p><p>no anchor</p>";
        assert!(parse_catalog(html, BASE).is_empty());
    }

    #[tokio::test]
    async fn persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/laws.json");
        let records = vec![LawRecord {
            code: "BGB".to_string(),
            title: "Civil Code".to_string(),
            source_link: "englisch_bgb/index.html".to_string(),
            pdf_url: format!("{BASE}englisch_bgb/englisch_bgb.pdf"),
        }];

        persist_catalog(&records, &path).await.unwrap();
        let loaded = load_catalog(&path).await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn load_rejects_malformed_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laws.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let err = load_catalog(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[tokio::test]
    async fn load_missing_catalog_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_catalog(&dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn external_json_keys_are_stable() {
        let record = LawRecord {
            code: "BGB".to_string(),
            title: "Civil Code".to_string(),
            source_link: "englisch_bgb/index.html".to_string(),
            pdf_url: "u".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("Law code").is_some());
        assert!(value.get("Law Title").is_some());
        assert!(value.get("Link").is_some());
        assert!(value.get("pdf_url").is_some());
    }
}
