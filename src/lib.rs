//! # Corpus Index
//!
//! A local pipeline that turns a directory of cleaned text documents into a
//! searchable semantic index.
//!
//! Documents are split into sentence-aligned chunks with stable ids, the
//! chunks are embedded by a pluggable text encoder, and the vectors are kept
//! in an exact nearest-neighbour index persisted next to a metadata file.
//! Re-running the pipeline only embeds chunks the index has not seen.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ data/clean  │──▶│   Chunker   │──▶│ data/chunks  │
//! │ <site>/*.txt│   │ (sentences) │   │ *_chunks.json│
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                   ┌─────────────┐   ┌──────▼───────┐
//!                   │   Encoder   │◀──│   Updater    │
//!                   │ local/remote│   │ (new ids)    │
//!                   └──────┬──────┘   └──────────────┘
//!                          ▼
//!                   ┌─────────────┐   ┌──────────────┐
//!                   │ IndexStore  │──▶│    Search    │
//!                   │ vectors+meta│   │   (top-k)    │
//!                   └─────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cidx chunk                      # split data/clean into chunk files
//! cidx embed                      # embed chunks not yet indexed
//! cidx search "reset my password" --k 5
//! cidx stats                      # index summary
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sentence-aligned text chunking and chunk ids |
//! | [`chunk_cmd`] | Chunking the clean directory into chunk files |
//! | [`embedding`] | Encoder abstraction and providers |
//! | [`index`] | Exact vector index with explicit ids |
//! | [`store`] | Index persistence alongside chunk metadata |
//! | [`embed_cmd`] | Incremental update and rebuild |
//! | [`search`] | Query service |
//! | [`stats`] | Index summary |

pub mod chunk;
pub mod chunk_cmd;
pub mod config;
pub mod embed_cmd;
pub mod embedding;
pub mod index;
pub mod models;
pub mod search;
pub mod stats;
pub mod store;
