//! Chunk every cleaned document under the clean directory.
//!
//! Layout read: `<clean_dir>/<site>/<name>.txt`. Layout written:
//! `<chunks_dir>/<site>/<name>_chunks.json` per document (replacing any
//! previous file) and `<chunks_dir>/all_chunks.json` across all documents.
//!
//! Failures are isolated per document: a file that cannot be read or whose
//! chunk file cannot be written is logged and the run moves on.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::chunk::{build_chunks, file_stem};
use crate::config::Config;
use crate::models::{Chunk, Document};

/// Counts from one chunking run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkReport {
    pub sites: usize,
    pub documents: usize,
    pub chunks: usize,
    /// Documents that could not be read.
    pub skipped: usize,
    /// Per-document chunk files that could not be written.
    pub write_failures: usize,
}

/// Run the chunk command and print a summary.
pub fn run_chunk(config: &Config) -> Result<ChunkReport> {
    let report = chunk_corpus(
        &config.paths.clean_dir,
        &config.paths.chunks_dir,
        config.chunking.max_words,
    )?;

    println!("chunk");
    println!("  sites: {}", report.sites);
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    println!("  skipped: {}", report.skipped);
    if report.write_failures > 0 {
        println!("  write failures: {}", report.write_failures);
    }

    Ok(report)
}

/// Chunk all documents and write the per-document and consolidated files.
///
/// A missing clean directory is not an error: nothing is chunked and no
/// files are written. Failing to write the consolidated file is an error.
pub fn chunk_corpus(clean_dir: &Path, chunks_dir: &Path, max_words: usize) -> Result<ChunkReport> {
    let mut report = ChunkReport::default();

    if !clean_dir.is_dir() {
        tracing::warn!(
            clean_dir = %clean_dir.display(),
            "clean directory does not exist; nothing to chunk"
        );
        return Ok(report);
    }

    let mut all_chunks = Vec::new();

    for site_dir in sorted_entries(clean_dir).into_iter().filter(|p| p.is_dir()) {
        let site = match site_dir.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        report.sites += 1;

        let out_dir = chunks_dir.join(&site);
        let out_dir_ok = match fs::create_dir_all(&out_dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(dir = %out_dir.display(), error = %e, "cannot create chunk directory");
                false
            }
        };

        for path in sorted_entries(&site_dir)
            .into_iter()
            .filter(|p| p.is_file() && is_text_file(p))
        {
            let document = match read_document(&site, &path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "failed to read document");
                    report.skipped += 1;
                    continue;
                }
            };

            let chunks = build_chunks(&document.site, &document.file_name, &document.text, max_words);
            report.documents += 1;
            report.chunks += chunks.len();

            let out_file = out_dir.join(format!("{}_chunks.json", file_stem(&document.file_name)));
            let written = out_dir_ok && {
                match write_chunk_file(&out_file, &chunks) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(file = %out_file.display(), error = %format!("{:#}", e), "failed to write chunk file");
                        false
                    }
                }
            };
            if written {
                tracing::info!(
                    source = %path.display(),
                    out = %out_file.display(),
                    chunks = chunks.len(),
                    "chunked document"
                );
            } else {
                report.write_failures += 1;
            }

            all_chunks.extend(chunks);
        }
    }

    fs::create_dir_all(chunks_dir)
        .with_context(|| format!("Failed to create chunks directory: {}", chunks_dir.display()))?;
    let all_path = chunks_dir.join("all_chunks.json");
    write_chunk_file(&all_path, &all_chunks)?;
    tracing::info!(
        file = %all_path.display(),
        chunks = all_chunks.len(),
        "wrote consolidated chunk collection"
    );

    Ok(report)
}

fn read_document(site: &str, path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Document {
        site: site.to_string(),
        file_name,
        text,
    })
}

/// Direct children of `dir`, sorted by name. Unreadable entries are logged and skipped.
fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .collect()
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false)
}

/// Write a chunk collection as pretty-printed JSON, replacing any existing file.
pub fn write_chunk_file(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let json = serde_json::to_string_pretty(chunks)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Read a chunk collection written by [`write_chunk_file`].
pub fn load_chunk_file(path: &Path) -> Result<Vec<Chunk>> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read chunk file: {}", path.display()))?;
    let chunks = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse chunk file: {}", path.display()))?;
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let clean = tmp.path().join("clean");
        let chunks = tmp.path().join("chunks");
        fs::create_dir_all(clean.join("beta")).unwrap();
        fs::create_dir_all(clean.join("alpha")).unwrap();
        fs::write(
            clean.join("alpha").join("guide.txt"),
            "Install the package. Run the setup wizard. Restart the service.",
        )
        .unwrap();
        fs::write(clean.join("alpha").join("notes.md"), "Not a text file.").unwrap();
        fs::write(
            clean.join("beta").join("Faq.TXT"),
            "Where is the config? It lives in the home directory.",
        )
        .unwrap();
        (tmp, clean, chunks)
    }

    #[test]
    fn test_chunks_sites_in_sorted_order() {
        let (_tmp, clean, out) = setup();
        let report = chunk_corpus(&clean, &out, 5).unwrap();
        assert_eq!(report.sites, 2);
        assert_eq!(report.documents, 2);
        assert_eq!(report.skipped, 0);

        let all = load_chunk_file(&out.join("all_chunks.json")).unwrap();
        assert_eq!(all.len(), report.chunks);
        assert_eq!(all[0].site, "alpha");
        assert_eq!(all.last().unwrap().site, "beta");
        assert_eq!(all.last().unwrap().source_file, "Faq.TXT");

        let per_doc = load_chunk_file(&out.join("alpha").join("guide_chunks.json")).unwrap();
        assert_eq!(per_doc.len(), 3);
        assert!(per_doc.iter().all(|c| c.source_file == "guide.txt"));
    }

    #[test]
    fn test_rerun_replaces_document_file() {
        let (_tmp, clean, out) = setup();
        chunk_corpus(&clean, &out, 5).unwrap();

        fs::write(clean.join("alpha").join("guide.txt"), "Only one sentence now.").unwrap();
        chunk_corpus(&clean, &out, 5).unwrap();

        let per_doc = load_chunk_file(&out.join("alpha").join("guide_chunks.json")).unwrap();
        assert_eq!(per_doc.len(), 1);
        assert_eq!(per_doc[0].text, "Only one sentence now.");
    }

    #[test]
    fn test_unreadable_document_is_skipped() {
        let (_tmp, clean, out) = setup();
        fs::write(clean.join("alpha").join("binary.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let report = chunk_corpus(&clean, &out, 5).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.documents, 2);
        assert!(!out.join("alpha").join("binary_chunks.json").exists());
    }

    #[test]
    fn test_unwritable_site_is_skipped() {
        let (_tmp, clean, out) = setup();
        fs::create_dir_all(&out).unwrap();
        // A regular file where the site's output directory should go.
        fs::write(out.join("alpha"), "in the way").unwrap();

        let report = chunk_corpus(&clean, &out, 5).unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.write_failures, 1);
        assert_eq!(report.skipped, 0);

        assert!(out.join("beta").join("Faq_chunks.json").exists());
        let all = load_chunk_file(&out.join("all_chunks.json")).unwrap();
        assert_eq!(all.len(), report.chunks);
        assert!(all.iter().any(|c| c.site == "alpha"));
        assert!(all.iter().any(|c| c.site == "beta"));
    }

    #[test]
    fn test_missing_clean_dir_is_noop() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("chunks");
        let report = chunk_corpus(&tmp.path().join("missing"), &out, 150).unwrap();
        assert_eq!(report, ChunkReport::default());
        assert!(!out.exists());
    }

    #[test]
    fn test_rechunking_reproduces_ids() {
        let (_tmp, clean, out) = setup();
        chunk_corpus(&clean, &out, 5).unwrap();
        let first = load_chunk_file(&out.join("all_chunks.json")).unwrap();
        chunk_corpus(&clean, &out, 5).unwrap();
        let second = load_chunk_file(&out.join("all_chunks.json")).unwrap();
        assert_eq!(first, second);
    }
}
