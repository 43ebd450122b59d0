//! Batch embedding and upsert of chunks.
//!
//! Must run after the purge for the document ids present in the chunk
//! set — the pipeline enforces that ordering, not this module. From the
//! indexer's point of view the write is an insert-only append; uniqueness
//! comes entirely from the preceding purge.

use tracing::debug;
use uuid::Uuid;

use crate::embedding::{DenseEmbedder, SparseEmbedder};
use crate::engine::{PointRecord, VectorEngine};
use crate::error::{Error, Result};
use crate::models::{Chunk, CollectionSchema};

/// Points per engine write once all embeddings are computed.
const UPSERT_PAGE: usize = 512;

/// Embed and write a set of chunks with full provenance payloads.
///
/// Dense vectors are computed in batches of `batch_size`; if the schema
/// has a sparse slot and a sparse embedder is supplied, a sparse vector
/// is computed per chunk as well. Any embedding failure aborts the whole
/// call before anything is written — no partial commits, so a document
/// never ends up with some chunks indexed and others missing.
pub async fn upsert_chunks(
    engine: &dyn VectorEngine,
    schema: &CollectionSchema,
    dense: &dyn DenseEmbedder,
    sparse: Option<&dyn SparseEmbedder>,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }
    if dense.dims() != schema.dense_dimension {
        return Err(Error::Schema(format!(
            "embedder produces {}-dimensional vectors but collection '{}' expects {}",
            dense.dims(),
            schema.name,
            schema.dense_dimension
        )));
    }

    let mut points = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        let dense_vectors = dense.embed(&texts).await?;
        if dense_vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                dense_vectors.len(),
                batch.len()
            )));
        }

        let sparse_vectors = match sparse {
            Some(embedder) if schema.has_sparse => {
                let vectors = embedder.embed_sparse(&texts).await?;
                if vectors.len() != batch.len() {
                    return Err(Error::Embedding(format!(
                        "sparse embedder returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    )));
                }
                vectors.into_iter().map(Some).collect()
            }
            _ => vec![None; batch.len()],
        };

        for ((chunk, dense_vec), sparse_vec) in
            batch.iter().zip(dense_vectors).zip(sparse_vectors)
        {
            let payload = serde_json::to_value(chunk.to_payload())
                .map_err(|e| Error::engine(format!("failed to serialize payload: {e}")))?;
            points.push(PointRecord {
                id: Uuid::new_v4().to_string(),
                dense: dense_vec,
                sparse: sparse_vec,
                payload,
            });
        }
    }

    let written = points.len();
    for page in points.chunks(UPSERT_PAGE) {
        engine.upsert_points(&schema.name, page.to_vec()).await?;
    }
    debug!(collection = %schema.name, written, "upserted chunks");

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Filter, QueryVector};
    use crate::engine_memory::MemoryEngine;
    use crate::models::{Distance, ScoreKind, SparseVector};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct StubDense {
        dims: usize,
    }

    #[async_trait]
    impl DenseEmbedder for StubDense {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; self.dims];
                    v[t.len() % self.dims] = 1.0;
                    v
                })
                .collect())
        }
    }

    struct StubSparse;

    #[async_trait]
    impl SparseEmbedder for StubSparse {
        fn model_name(&self) -> &str {
            "stub-sparse"
        }
        async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
            Ok(texts
                .iter()
                .map(|t| SparseVector {
                    indices: vec![t.len() as u32],
                    values: vec![1.0],
                })
                .collect())
        }
    }

    struct FailingDense;

    #[async_trait]
    impl DenseEmbedder for FailingDense {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(Error::Embedding("quota exceeded".to_string()))
        }
    }

    fn schema(sparse: bool) -> CollectionSchema {
        CollectionSchema {
            name: "c".to_string(),
            dense_dimension: 4,
            distance: Distance::Cosine,
            has_sparse: sparse,
            score_kind: ScoreKind::Similarity,
        }
    }

    fn chunk(text: &str) -> Chunk {
        let mut header_path = BTreeMap::new();
        header_path.insert(1, "Coverage".to_string());
        Chunk {
            text: text.to_string(),
            document_id: "doc-1".to_string(),
            organization: "Acme".to_string(),
            document_name: "acme_policy.md".to_string(),
            source_path: "/corpus/acme_policy.md".to_string(),
            ingested_at: Utc::now(),
            header_path,
        }
    }

    #[tokio::test]
    async fn test_upsert_writes_payload_with_headers() {
        let engine = MemoryEngine::new();
        engine.create_collection(&schema(false)).await.unwrap();

        let written = upsert_chunks(
            &engine,
            &schema(false),
            &StubDense { dims: 4 },
            None,
            &[chunk("# Coverage\nbody text")],
            8,
        )
        .await
        .unwrap();

        assert_eq!(written, 1);
        let page = engine
            .scroll("c", &Filter::equals("document_id", "doc-1"), 10, None, true)
            .await
            .unwrap();
        let payload = page.points[0].payload.as_ref().unwrap();
        assert_eq!(payload["organization"], "Acme");
        assert_eq!(payload["header_1"], "Coverage");
        assert_eq!(payload["document_name"], "acme_policy.md");
    }

    #[tokio::test]
    async fn test_dims_mismatch_is_schema_error() {
        let engine = MemoryEngine::new();
        engine.create_collection(&schema(false)).await.unwrap();

        let err = upsert_chunks(
            &engine,
            &schema(false),
            &StubDense { dims: 8 },
            None,
            &[chunk("text")],
            8,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert_eq!(engine.point_count("c"), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let engine = MemoryEngine::new();
        engine.create_collection(&schema(false)).await.unwrap();

        let err = upsert_chunks(
            &engine,
            &schema(false),
            &FailingDense,
            None,
            &[chunk("a"), chunk("b")],
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert_eq!(engine.point_count("c"), 0);
    }

    #[tokio::test]
    async fn test_sparse_vectors_written_when_schema_has_slot() {
        let engine = MemoryEngine::new();
        engine.create_collection(&schema(true)).await.unwrap();

        upsert_chunks(
            &engine,
            &schema(true),
            &StubDense { dims: 4 },
            Some(&StubSparse),
            &[chunk("hybrid text")],
            8,
        )
        .await
        .unwrap();

        // Hybrid query succeeds, proving a sparse vector was stored.
        let hits = engine
            .query(
                "c",
                &QueryVector::Hybrid {
                    dense: vec![1.0, 0.0, 0.0, 0.0],
                    sparse: SparseVector {
                        indices: vec![11],
                        values: vec![1.0],
                    },
                },
                &Filter::default(),
                5,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
