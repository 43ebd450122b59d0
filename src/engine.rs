//! Vector engine abstraction.
//!
//! The engine stores vectors with payloads and answers filtered
//! nearest-neighbor and scroll queries. Its internal index structure is
//! out of scope; implementations only have to honor this interface.
//! [`crate::engine_qdrant::QdrantEngine`] talks to a Qdrant server over
//! HTTP; [`crate::engine_memory::MemoryEngine`] is an in-process
//! brute-force implementation used by tests and ephemeral runs.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::{CollectionSchema, SparseVector};

/// An exact-match condition on one payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub key: String,
    pub value: String,
}

/// A conjunction of exact-match payload conditions. An empty filter
/// matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub must: Vec<FieldCondition>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Single-condition equality filter.
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter {
            must: vec![FieldCondition {
                key: key.into(),
                value: value.into(),
            }],
        }
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FieldCondition {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// A record to be written: one dense vector, an optional sparse vector,
/// and the payload carrying all chunk metadata.
#[derive(Debug, Clone)]
pub struct PointRecord {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: Option<SparseVector>,
    pub payload: Value,
}

/// A nearest-neighbor hit with the engine's raw score. Whether the score
/// is a similarity or a distance is declared by the collection schema.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f64,
    pub payload: Value,
}

/// One point returned from a scroll. Payload is omitted when the caller
/// only needs ids.
#[derive(Debug, Clone)]
pub struct ScrolledPoint {
    pub id: String,
    pub payload: Option<Value>,
}

/// One page of a filtered scan. `next_offset` is an opaque continuation
/// token; `None` means the scan is complete.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub points: Vec<ScrolledPoint>,
    pub next_offset: Option<Value>,
}

/// The query vector(s) for a nearest-neighbor search.
#[derive(Debug, Clone)]
pub enum QueryVector {
    Dense(Vec<f32>),
    /// Dense and sparse signals fused by the engine.
    Hybrid {
        dense: Vec<f32>,
        sparse: SparseVector,
    },
}

/// Operations the rest of the crate needs from a vector store.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection with the given schema. Fails if the engine
    /// rejects the configuration or the collection already exists.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    /// Insert points. Append-only from the caller's perspective:
    /// uniqueness is enforced by purging before insertion, not here.
    async fn upsert_points(&self, collection: &str, points: Vec<PointRecord>) -> Result<()>;

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// Filtered scan with capped page size and continuation offset.
    async fn scroll(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
        offset: Option<Value>,
        with_payload: bool,
    ) -> Result<ScrollPage>;

    /// Filtered nearest-neighbor search returning up to `top_k` hits,
    /// most relevant first by the engine's raw score convention.
    async fn query(
        &self,
        collection: &str,
        query: &QueryVector,
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = Filter::equals("organization", "Acme").and("header_1", "Coverage");
        assert_eq!(filter.must.len(), 2);
        assert_eq!(filter.must[0].key, "organization");
        assert_eq!(filter.must[1].value, "Coverage");
        assert!(!filter.is_empty());
        assert!(Filter::default().is_empty());
    }
}
