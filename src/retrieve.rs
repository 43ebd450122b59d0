//! Query-time retrieval: filtered nearest-neighbor search and
//! metadata-only browsing.
//!
//! Scores leave this module normalized to `[0, 1]` with higher meaning
//! more relevant, regardless of the engine's raw convention. The
//! collection schema declares whether the engine reports similarities or
//! distances; the retriever converts accordingly instead of guessing
//! from the value.

use tracing::warn;

use crate::embedding::{DenseEmbedder, SparseEmbedder};
use crate::engine::{Filter, QueryVector, VectorEngine};
use crate::error::{Error, Result};
use crate::models::{ChunkPayload, CollectionSchema, RetrievalResult, ScoreKind};

/// Page cap for metadata-only scans.
const BROWSE_PAGE: usize = 256;

/// How query vectors are produced and matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Dense nearest-neighbor only.
    Dense,
    /// Dense and sparse channels fused by the engine.
    Hybrid,
}

/// Metadata constraints for search and browse. All present fields must
/// match exactly; an empty set means unconstrained (search only —
/// browsing requires at least one).
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    pub organization: Option<String>,
    pub document_name: Option<String>,
    pub header_1: Option<String>,
}

impl RetrievalFilters {
    pub fn is_empty(&self) -> bool {
        self.organization.is_none() && self.document_name.is_none() && self.header_1.is_none()
    }

    fn to_filter(&self) -> Filter {
        let mut filter = Filter::default();
        if let Some(org) = &self.organization {
            filter = filter.and("organization", org.clone());
        }
        if let Some(name) = &self.document_name {
            filter = filter.and("document_name", name.clone());
        }
        if let Some(header) = &self.header_1 {
            filter = filter.and("header_1", header.clone());
        }
        filter
    }
}

/// Filtered semantic search over one collection.
pub struct Retriever<'a> {
    engine: &'a dyn VectorEngine,
    /// Only needed for [`Retriever::retrieve`]; metadata browsing never
    /// embeds anything.
    dense: Option<&'a dyn DenseEmbedder>,
    sparse: Option<&'a dyn SparseEmbedder>,
    schema: &'a CollectionSchema,
    mode: RetrievalMode,
    min_score: f64,
}

impl std::fmt::Debug for Retriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("mode", &self.mode)
            .field("min_score", &self.min_score)
            .finish_non_exhaustive()
    }
}

impl<'a> Retriever<'a> {
    /// Build a retriever. Hybrid mode is refused outright when the
    /// collection has no sparse slot or no sparse provider is configured;
    /// silently degrading to dense-only would misrepresent results.
    pub fn new(
        engine: &'a dyn VectorEngine,
        dense: Option<&'a dyn DenseEmbedder>,
        sparse: Option<&'a dyn SparseEmbedder>,
        schema: &'a CollectionSchema,
        mode: RetrievalMode,
        min_score: f64,
    ) -> Result<Self> {
        if mode == RetrievalMode::Hybrid {
            if !schema.has_sparse {
                return Err(Error::config(format!(
                    "hybrid retrieval requires a sparse vector slot, but collection '{}' has none",
                    schema.name
                )));
            }
            if sparse.is_none() {
                return Err(Error::config(
                    "hybrid retrieval requires a sparse provider; set [sparse] provider in config",
                ));
            }
        }
        if !(0.0..=1.0).contains(&min_score) {
            return Err(Error::config(format!(
                "min_score must be within [0, 1], got {min_score}"
            )));
        }

        Ok(Self {
            engine,
            dense,
            sparse,
            schema,
            mode,
            min_score,
        })
    }

    /// Search for the chunks most relevant to `query`, constrained by
    /// `filters`. Returns up to `top_k` hits, best first, with normalized
    /// scores. In dense mode, hits below the minimum score are dropped;
    /// hybrid scores come from rank fusion and are not comparable to a
    /// similarity threshold, so the cutoff does not apply there.
    pub async fn retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if top_k == 0 {
            return Err(Error::InvalidQuery("top_k must be at least 1".to_string()));
        }

        let dense = self.dense.ok_or_else(|| {
            Error::config("semantic retrieval requires an embedding provider")
        })?;
        let query_owned = vec![query.to_string()];
        let dense_vec = dense
            .embed(&query_owned)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector for query".to_string()))?;

        let query_vector = match self.mode {
            RetrievalMode::Dense => QueryVector::Dense(dense_vec),
            RetrievalMode::Hybrid => {
                // Presence validated at construction.
                let sparse = self
                    .sparse
                    .ok_or_else(|| Error::config("sparse provider missing"))?;
                let sparse_vec = sparse
                    .embed_sparse(&query_owned)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        Error::Embedding("sparse embedder returned no vector for query".to_string())
                    })?;
                QueryVector::Hybrid {
                    dense: dense_vec,
                    sparse: sparse_vec,
                }
            }
        };

        let hits = self
            .engine
            .query(&self.schema.name, &query_vector, &filters.to_filter(), top_k)
            .await?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload: ChunkPayload = match serde_json::from_value(hit.payload) {
                Ok(p) => p,
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "skipping hit with malformed payload");
                    continue;
                }
            };
            let score = normalize_score(hit.score, self.schema.score_kind);
            // Fused hybrid scores are reciprocal-rank sums, an order of
            // magnitude below similarities; a similarity threshold would
            // silently empty hybrid results, so it applies to dense only.
            if self.mode == RetrievalMode::Dense && score < self.min_score {
                continue;
            }
            results.push(RetrievalResult {
                text: payload.text.clone(),
                score,
                payload,
            });
        }

        Ok(results)
    }

    /// Browse chunks by metadata alone, no query vector involved. At least
    /// one filter is required: an unconstrained scan over the whole
    /// collection is never what a caller wants and is refused. Results
    /// carry the sentinel score `1.0`.
    pub async fn retrieve_by_metadata(
        &self,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        if filters.is_empty() {
            return Err(Error::InvalidQuery(
                "metadata retrieval requires at least one filter".to_string(),
            ));
        }
        if limit == 0 {
            return Err(Error::InvalidQuery("limit must be at least 1".to_string()));
        }

        let filter = filters.to_filter();
        let mut results = Vec::new();
        let mut offset = None;

        while results.len() < limit {
            let page_size = BROWSE_PAGE.min(limit - results.len());
            let page = self
                .engine
                .scroll(&self.schema.name, &filter, page_size, offset, true)
                .await?;

            for point in page.points {
                let Some(payload_value) = point.payload else {
                    continue;
                };
                let payload: ChunkPayload = match serde_json::from_value(payload_value) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(id = %point.id, error = %e, "skipping record with malformed payload");
                        continue;
                    }
                };
                results.push(RetrievalResult {
                    text: payload.text.clone(),
                    score: 1.0,
                    payload,
                });
                if results.len() == limit {
                    return Ok(results);
                }
            }

            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(results)
    }
}

/// Map a raw engine score into `[0, 1]`, higher = more relevant.
fn normalize_score(raw: f64, kind: ScoreKind) -> f64 {
    let score = match kind {
        ScoreKind::Similarity => raw,
        ScoreKind::Distance => 1.0 - raw,
    };
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PointRecord;
    use crate::engine_memory::MemoryEngine;
    use crate::models::{Distance, SparseVector};
    use async_trait::async_trait;
    use serde_json::json;

    /// Maps known phrases to fixed unit vectors so ranking is predictable.
    struct PhraseDense;

    fn phrase_vector(text: &str) -> Vec<f32> {
        if text.contains("travel") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("dental") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl DenseEmbedder for PhraseDense {
        fn model_name(&self) -> &str {
            "phrase"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| phrase_vector(t)).collect())
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
                    indices: vec![t.len() as u32 % 7],
                    values: vec![1.0],
                })
                .collect())
        }
    }

    fn schema(sparse: bool) -> CollectionSchema {
        CollectionSchema {
            name: "c".to_string(),
            dense_dimension: 3,
            distance: Distance::Cosine,
            has_sparse: sparse,
            score_kind: ScoreKind::Similarity,
        }
    }

    fn payload(text: &str, org: &str, header: &str) -> serde_json::Value {
        json!({
            "text": text,
            "document_id": "doc-1",
            "organization": org,
            "document_name": format!("{}_policy.md", org.to_lowercase()),
            "source_path": format!("/corpus/{}_policy.md", org.to_lowercase()),
            "ingested_at": "2026-01-15T12:00:00+00:00",
            "header_1": header,
        })
    }

    async fn seeded_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.create_collection(&schema(false)).await.unwrap();
        engine
            .upsert_points(
                "c",
                vec![
                    PointRecord {
                        id: "p1".to_string(),
                        dense: vec![1.0, 0.0, 0.0],
                        sparse: None,
                        payload: payload("travel coverage", "Acme", "Coverage"),
                    },
                    PointRecord {
                        id: "p2".to_string(),
                        dense: vec![0.0, 1.0, 0.0],
                        sparse: None,
                        payload: payload("dental coverage", "Acme", "Coverage"),
                    },
                    PointRecord {
                        id: "p3".to_string(),
                        dense: vec![0.9, 0.1, 0.0],
                        sparse: None,
                        payload: payload("travel exclusions", "Globex", "Exclusions"),
                    },
                ],
            )
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_relevance() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let results = retriever
            .retrieve("travel", &RetrievalFilters::default(), 3)
            .await
            .unwrap();
        assert_eq!(results[0].text, "travel coverage");
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_retrieve_applies_filters() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let filters = RetrievalFilters {
            organization: Some("Globex".to_string()),
            ..Default::default()
        };
        let results = retriever.retrieve("travel", &filters, 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.organization, "Globex");

        let filters = RetrievalFilters {
            organization: Some("Initech".to_string()),
            ..Default::default()
        };
        let results = retriever.retrieve("travel", &filters, 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_min_score_threshold_is_monotonic() {
        let engine = seeded_engine().await;
        let s = schema(false);

        let loose =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();
        let strict =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.8).unwrap();

        let all = loose
            .retrieve("travel", &RetrievalFilters::default(), 3)
            .await
            .unwrap();
        let few = strict
            .retrieve("travel", &RetrievalFilters::default(), 3)
            .await
            .unwrap();

        assert!(few.len() <= all.len());
        assert!(few.iter().all(|r| r.score >= 0.8));
    }

    #[tokio::test]
    async fn test_zero_top_k_is_invalid() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let err = retriever
            .retrieve("travel", &RetrievalFilters::default(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_hybrid_without_sparse_slot_is_refused() {
        let engine = MemoryEngine::new();
        let s = schema(false);
        let err = Retriever::new(
            &engine,
            Some(&PhraseDense),
            Some(&StubSparse),
            &s,
            RetrievalMode::Hybrid,
            0.0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_hybrid_without_provider_is_refused() {
        let engine = MemoryEngine::new();
        let s = schema(true);
        let err =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Hybrid, 0.0)
                .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_min_score_does_not_apply_to_fused_scores() {
        // Rank-fused scores sit near 2/(60+1); a threshold meaningful for
        // cosine similarities must not wipe out hybrid results.
        let engine = MemoryEngine::new();
        let s = schema(true);
        engine.create_collection(&s).await.unwrap();
        engine
            .upsert_points(
                "c",
                vec![PointRecord {
                    id: "p1".to_string(),
                    dense: vec![1.0, 0.0, 0.0],
                    sparse: Some(SparseVector {
                        indices: vec![6],
                        values: vec![1.0],
                    }),
                    payload: payload("travel coverage", "Acme", "Coverage"),
                }],
            )
            .await
            .unwrap();

        let retriever = Retriever::new(
            &engine,
            Some(&PhraseDense),
            Some(&StubSparse),
            &s,
            RetrievalMode::Hybrid,
            0.8,
        )
        .unwrap();

        let results = retriever
            .retrieve("travel", &RetrievalFilters::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score < 0.8);
    }

    #[tokio::test]
    async fn test_browse_requires_a_filter() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let err = retriever
            .retrieve_by_metadata(&RetrievalFilters::default(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_browse_returns_sentinel_scores() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let filters = RetrievalFilters {
            organization: Some("Acme".to_string()),
            ..Default::default()
        };
        let results = retriever.retrieve_by_metadata(&filters, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 1.0));
        assert!(results.iter().all(|r| r.payload.organization == "Acme"));
    }

    #[tokio::test]
    async fn test_browse_respects_limit() {
        let engine = seeded_engine().await;
        let s = schema(false);
        let retriever =
            Retriever::new(&engine, Some(&PhraseDense), None, &s, RetrievalMode::Dense, 0.0).unwrap();

        let filters = RetrievalFilters {
            organization: Some("Acme".to_string()),
            ..Default::default()
        };
        let results = retriever.retrieve_by_metadata(&filters, 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_normalize_similarity_passthrough() {
        assert_eq!(normalize_score(0.7, ScoreKind::Similarity), 0.7);
        assert_eq!(normalize_score(1.3, ScoreKind::Similarity), 1.0);
        assert_eq!(normalize_score(-0.2, ScoreKind::Similarity), 0.0);
    }

    #[test]
    fn test_normalize_distance_inverts() {
        assert!((normalize_score(0.2, ScoreKind::Distance) - 0.8).abs() < 1e-9);
        assert_eq!(normalize_score(2.5, ScoreKind::Distance), 0.0);
    }
}
