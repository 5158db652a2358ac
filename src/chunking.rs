//! Token-bounded recursive text splitting.
//!
//! Chunk length is measured in cl100k_base tokens so the unit is consistent
//! across runs and matches what embedding models actually consume. Splitting
//! prefers the earliest separator in the configured preference list that
//! occurs in the text, recursing with the remaining separators for oversized
//! pieces, and falls back to a hard cut at token boundaries when no
//! separator is left. For a fixed configuration the output boundaries are
//! byte-identical across runs.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use uuid::Uuid;

use crate::cleaning::CleanedDocument;
use crate::types::PipelineError;

/// A bounded, overlapping retrieval unit with document/page provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawChunk {
    /// Random unique id; chunk *boundaries* are deterministic, ids are not.
    pub id: String,
    /// Source PDF path the chunk came from.
    pub source: String,
    /// Page index at which the chunk's text begins (approximate provenance).
    pub page: usize,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    pub content: String,
    pub token_count: usize,
}

/// Recursive separator-preference splitter with a token budget.
pub struct TextSplitter {
    max_tokens: usize,
    overlap_tokens: usize,
    separators: Vec<String>,
    bpe: CoreBPE,
}

// manual impl: CoreBPE carries no useful Debug output
impl fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextSplitter")
            .field("max_tokens", &self.max_tokens)
            .field("overlap_tokens", &self.overlap_tokens)
            .field("separators", &self.separators)
            .finish_non_exhaustive()
    }
}

impl TextSplitter {
    /// Build a splitter. `overlap_tokens` must be smaller than `max_tokens`.
    pub fn new(
        max_tokens: usize,
        overlap_tokens: usize,
        separators: Vec<String>,
    ) -> Result<Self, PipelineError> {
        if max_tokens == 0 {
            return Err(PipelineError::Chunking(
                "max_tokens must be positive".to_string(),
            ));
        }
        if overlap_tokens >= max_tokens {
            return Err(PipelineError::Chunking(format!(
                "overlap ({overlap_tokens}) must be smaller than max_tokens ({max_tokens})"
            )));
        }
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|err| PipelineError::Chunking(err.to_string()))?;
        Ok(Self {
            max_tokens,
            overlap_tokens,
            separators,
            bpe,
        })
    }

    /// The separator preference list used by the statute pipeline.
    ///
    /// The order is historical and deliberately kept: `"\n"` shadows
    /// `"\n\n"` whenever any newline is present.
    pub fn default_separators() -> Vec<String> {
        ["\n", "\n\n", ",", "."].map(str::to_string).to_vec()
    }

    /// cl100k_base token count of `text`.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Split raw text into chunks of at most `max_tokens` tokens.
    ///
    /// Every emitted chunk is a contiguous substring of `text`; consecutive
    /// chunks from the same merge run share up to `overlap_tokens` of
    /// content at the boundary.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split whole documents into provenance-carrying chunks.
    ///
    /// Pages of one document are streamed together (joined by `\n`), so
    /// chunks may span page boundaries within a document but never cross
    /// documents. Whitespace-only fragments are dropped.
    pub fn split_documents(&self, documents: &[CleanedDocument]) -> Vec<LawChunk> {
        let mut chunks = Vec::new();

        for document in documents {
            let mut text = String::new();
            let mut page_offsets: Vec<(usize, usize)> = Vec::new();
            for page in &document.pages {
                if !text.is_empty() {
                    text.push('\n');
                }
                page_offsets.push((text.len(), page.page_index));
                text.push_str(&page.content);
            }

            let source = document.source.display().to_string();
            let mut search_from = 0usize;
            let mut chunk_index = 0usize;
            for content in self.split_text(&text) {
                if content.trim().is_empty() {
                    continue;
                }
                // chunks are in-order substrings; walk a cursor instead of
                // rescanning the whole document each time
                let start = text[search_from..]
                    .find(&content)
                    .map(|rel| search_from + rel)
                    .unwrap_or(search_from);
                let page = page_offsets
                    .iter()
                    .rev()
                    .find(|(offset, _)| *offset <= start)
                    .map(|(_, index)| *index)
                    .unwrap_or(0);
                search_from = (start + 1).min(text.len());

                let token_count = self.count_tokens(&content);
                chunks.push(LawChunk {
                    id: Uuid::new_v4().to_string(),
                    source: source.clone(),
                    page,
                    chunk_index,
                    content,
                    token_count,
                });
                chunk_index += 1;
            }
        }

        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let Some((position, separator)) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| !sep.is_empty() && text.contains(sep.as_str()))
        else {
            return self.hard_cut(text);
        };
        let remaining = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if self.count_tokens(&piece) <= self.max_tokens {
                pending.push(piece);
            } else {
                if !pending.is_empty() {
                    self.merge_pieces(&mut chunks, &pending);
                    pending.clear();
                }
                if remaining.is_empty() {
                    chunks.extend(self.hard_cut(&piece));
                } else {
                    chunks.extend(self.split_recursive(&piece, remaining));
                }
            }
        }
        if !pending.is_empty() {
            self.merge_pieces(&mut chunks, &pending);
        }
        chunks
    }

    /// Greedily pack consecutive pieces into chunks within the token budget,
    /// retaining a trailing window of up to `overlap_tokens` as the start of
    /// the next chunk.
    fn merge_pieces(&self, chunks: &mut Vec<String>, pieces: &[String]) {
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_tokens = 0usize;
        let mut fresh = false;

        for piece in pieces {
            let count = self.count_tokens(piece);
            if window_tokens + count > self.max_tokens && !window.is_empty() {
                if fresh {
                    self.emit(chunks, &window);
                    fresh = false;
                }
                while window_tokens > self.overlap_tokens
                    || (window_tokens + count > self.max_tokens && window_tokens > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => window_tokens -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece.clone(), count));
            window_tokens += count;
            fresh = true;
        }

        if fresh && !window.is_empty() {
            self.emit(chunks, &window);
        }
    }

    fn emit(&self, chunks: &mut Vec<String>, window: &VecDeque<(String, usize)>) {
        let chunk: String = window.iter().map(|(piece, _)| piece.as_str()).collect();
        // BPE counts of concatenations are not exactly additive; re-check
        if self.count_tokens(&chunk) > self.max_tokens {
            chunks.extend(self.hard_cut(&chunk));
        } else {
            chunks.push(chunk);
        }
    }

    /// Cut text that contains no usable separator at token boundaries.
    fn hard_cut(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            if self.count_tokens(rest) <= self.max_tokens {
                chunks.push(rest.to_string());
                break;
            }
            let cut = self.longest_fitting_prefix(rest);
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        chunks
    }

    /// Largest char boundary whose prefix stays within the token budget.
    ///
    /// Token counts are not strictly monotonic in prefix length, so the
    /// binary-search result is nudged down until the budget holds. Always
    /// advances by at least one character.
    fn longest_fitting_prefix(&self, text: &str) -> usize {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(index, _)| index)
            .skip(1)
            .chain([text.len()])
            .collect();

        let mut low = 0usize;
        let mut high = boundaries.len() - 1;
        while low < high {
            let mid = low + (high - low + 1) / 2;
            if self.count_tokens(&text[..boundaries[mid]]) <= self.max_tokens {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        let mut index = low;
        while index > 0 && self.count_tokens(&text[..boundaries[index]]) > self.max_tokens {
            index -= 1;
        }
        boundaries[index]
    }
}

/// Split on `separator`, keeping the separator attached to the end of each
/// piece so that concatenating the pieces reproduces the input exactly.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    while let Some(found) = text[start..].find(separator) {
        let end = start + found + separator.len();
        pieces.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}
