//! Sentence-boundary text chunker.
//!
//! Splits document text into [`Chunk`]s that respect a configurable
//! `max_words` limit. Splitting only ever happens between sentences, so a
//! sentence longer than the limit becomes a chunk of its own rather than
//! being cut in half.
//!
//! Each chunk receives a deterministic id derived from its site, the source
//! file stem, and its index, so re-chunking unchanged input reproduces the
//! same ids.

use sha2::{Digest, Sha256};
use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::Chunk;

/// Default upper bound on whitespace tokens per chunk.
pub const DEFAULT_MAX_WORDS: usize = 150;

/// Split text into sentences using Unicode sentence boundaries.
///
/// Whitespace (including hard line wraps left over from extraction) is
/// collapsed first, so a sentence wrapped across lines stays one sentence.
/// Each returned sentence is trimmed and non-empty.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    normalized
        .split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split text into chunk texts of at most `max_words` whitespace tokens.
///
/// Sentences accumulate into the current chunk until the next one would push
/// the word count past `max_words`; that sentence then opens a new chunk.
/// Returns an empty vector for whitespace-only input.
pub fn chunk_text(text: &str, max_words: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for sentence in &sentences {
        let words: Vec<&str> = sentence.split_whitespace().collect();

        if current.len() + words.len() > max_words {
            if !current.is_empty() {
                chunks.push(current.join(" "));
            }
            current = words;
        } else {
            current.extend(words);
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

/// Chunk a document and stamp each piece with its provenance and id.
pub fn build_chunks(site: &str, source_file: &str, text: &str, max_words: usize) -> Vec<Chunk> {
    let stem = file_stem(source_file);

    chunk_text(text, max_words)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: chunk_id(site, &stem, i),
            site: site.to_string(),
            source_file: source_file.to_string(),
            chunk_index: i,
            text,
        })
        .collect()
}

/// Deterministic chunk id: hex SHA-256 of `site|stem|index`.
///
/// Depends on position only, never on content.
pub fn chunk_id(site: &str, stem: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", site, stem, chunk_index).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File name without its final extension (`"report.v2.txt"` → `"report.v2"`).
pub fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string())
}
