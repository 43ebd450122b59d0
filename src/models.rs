//! Core data models used throughout Policy Index.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A loaded source document, alive for the duration of one ingestion run.
///
/// Documents are never persisted as objects; their identity and metadata
/// are propagated into every derived [`Chunk`].
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute or corpus-relative path, unique within the corpus.
    pub source_path: String,
    /// Digest of `source_path`; the dedup key for all derived chunks.
    pub stable_id: String,
    /// Filename, used for display and the `document_name` payload field.
    pub display_name: String,
    /// Organization derived from the filename naming convention.
    pub organization: String,
    /// Full markdown text.
    pub raw_text: String,
    pub ingested_at: DateTime<Utc>,
}

/// A header-scoped slice of a document, the unit of indexing and retrieval.
///
/// Immutable once created; a later ingestion of the same document supersedes
/// its chunks, it never mutates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub document_id: String,
    pub organization: String,
    pub document_name: String,
    pub source_path: String,
    pub ingested_at: DateTime<Utc>,
    /// Header text active at this point in the document, keyed by level.
    /// The set of keys is always a prefix of the levels present above the
    /// chunk in the source: level 3 never appears without levels 1 and 2
    /// when those headers exist.
    pub header_path: BTreeMap<u8, String>,
}

impl Chunk {
    /// Flatten the chunk into the payload stored alongside its vectors.
    pub fn to_payload(&self) -> ChunkPayload {
        let headers = self
            .header_path
            .iter()
            .map(|(level, text)| (format!("header_{level}"), text.clone()))
            .collect();
        ChunkPayload {
            text: self.text.clone(),
            document_id: self.document_id.clone(),
            organization: self.organization.clone(),
            document_name: self.document_name.clone(),
            source_path: self.source_path.clone(),
            ingested_at: self.ingested_at.to_rfc3339(),
            headers,
        }
    }
}

/// The payload persisted with every index record: the fixed provenance
/// fields plus one `header_N` key per header level present in the chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub document_id: String,
    pub organization: String,
    pub document_name: String,
    pub source_path: String,
    pub ingested_at: String,
    #[serde(flatten)]
    pub headers: BTreeMap<String, String>,
}

/// A single retrieval hit. Produced only by the retriever, never persisted.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub text: String,
    /// Similarity in `[0, 1]`, higher is more relevant. Metadata-only scans
    /// report the sentinel value `1.0`.
    pub score: f64,
    pub payload: ChunkPayload,
}

/// Distance metric for the dense vector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    /// Wire name used by the Qdrant HTTP API.
    pub fn as_engine_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }
}

/// Whether the engine reports raw scores as similarities (higher = closer)
/// or distances (lower = closer). Declared per collection so the retriever
/// never has to guess from the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Similarity,
    Distance,
}

/// Vector schema for a collection, fixed at creation time.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub name: String,
    pub dense_dimension: usize,
    pub distance: Distance,
    /// Whether the collection carries a parallel sparse vector slot.
    pub has_sparse: bool,
    pub score_kind: ScoreKind,
}

/// Term-weight representation capturing lexical overlap, in the engine's
/// indices/values form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}
