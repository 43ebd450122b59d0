//! # Policy Index
//!
//! Header-scoped markdown ingestion and hybrid retrieval over a vector store.
//!
//! Policy Index takes a directory of markdown policy documents, splits each
//! one into header-scoped chunks, embeds them, and writes them to a vector
//! engine with full provenance metadata. Retrieval combines semantic
//! similarity with exact-match payload filters, optionally fused with a
//! sparse (lexical) signal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌──────────────┐
//! │  Corpus  │──▶│ Identity │──▶│ Chunker │──▶│ Purge+Upsert │
//! │  (*.md)  │   │ stable_id│   │ headers │   │ VectorEngine │
//! └──────────┘   └──────────┘   └─────────┘   └──────┬───────┘
//!                                                    │
//!                                             ┌──────┴──────┐
//!                                             │  Retriever  │
//!                                             │ dense/hybrid│
//!                                             └─────────────┘
//! ```
//!
//! Each document's identity is a digest of its source path. Re-ingesting a
//! document purges every record carrying its `document_id` before inserting
//! the new generation, so at most one generation of chunks per document is
//! authoritative after a successful run.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`identity`] | Stable document ids and organization extraction |
//! | [`chunker`] | Hierarchical markdown header splitter |
//! | [`engine`] | Vector engine abstraction |
//! | [`engine_qdrant`] | Qdrant HTTP implementation |
//! | [`engine_memory`] | In-process implementation for tests |
//! | [`embedding`] | Dense and sparse embedding providers |
//! | [`collection`] | Collection bootstrap |
//! | [`dedup`] | Per-document purge before reinsertion |
//! | [`index`] | Batch embed and upsert |
//! | [`retrieve`] | Filtered similarity and metadata queries |
//! | [`ingest`] | End-to-end ingestion pipeline |
//! | [`dump`] | Human-readable chunk dumps |

pub mod chunker;
pub mod collection;
pub mod config;
pub mod dedup;
pub mod dump;
pub mod embedding;
pub mod engine;
pub mod engine_memory;
pub mod engine_qdrant;
pub mod error;
pub mod identity;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieve;

pub use error::{Error, Result};
