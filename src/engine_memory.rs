//! In-process [`VectorEngine`] implementation.
//!
//! Brute-force search over `Vec`s behind `std::sync::RwLock`. Dense
//! scoring follows the collection's distance metric; hybrid queries use
//! reciprocal-rank fusion over the dense and sparse rankings, matching
//! the server-side engine's fusion behavior. Used by tests and ephemeral
//! runs; insertion order is preserved so scrolls are deterministic.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::embedding::cosine_similarity;
use crate::engine::{
    Filter, PointRecord, QueryVector, ScoredPoint, ScrollPage, ScrolledPoint, VectorEngine,
};
use crate::error::{Error, Result};
use crate::models::{CollectionSchema, Distance, SparseVector};

/// Reciprocal-rank fusion constant, same as Qdrant's default.
const RRF_K: f64 = 60.0;

struct MemCollection {
    schema: CollectionSchema,
    points: Vec<PointRecord>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct MemoryEngine {
    collections: RwLock<HashMap<String, MemCollection>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored points, for test assertions.
    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .expect("engine lock poisoned")
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

fn matches_filter(payload: &Value, filter: &Filter) -> bool {
    filter.must.iter().all(|cond| {
        payload
            .get(&cond.key)
            .and_then(Value::as_str)
            .map(|v| v == cond.value)
            .unwrap_or(false)
    })
}

fn dense_score(metric: Distance, query: &[f32], point: &[f32]) -> f64 {
    match metric {
        Distance::Cosine => cosine_similarity(query, point) as f64,
        Distance::Dot => query.iter().zip(point).map(|(a, b)| (a * b) as f64).sum(),
        Distance::Euclid => {
            let dist: f64 = query
                .iter()
                .zip(point)
                .map(|(a, b)| ((a - b) as f64).powi(2))
                .sum::<f64>()
                .sqrt();
            // Higher = closer, like the server reports for euclid queries.
            -dist
        }
    }
}

fn sparse_score(query: &SparseVector, point: &SparseVector) -> f64 {
    let weights: HashMap<u32, f32> = point
        .indices
        .iter()
        .copied()
        .zip(point.values.iter().copied())
        .collect();
    query
        .indices
        .iter()
        .zip(query.values.iter())
        .filter_map(|(idx, val)| weights.get(idx).map(|w| (*w * *val) as f64))
        .sum()
}

/// Rank a candidate list descending by score and return index → rank.
fn ranks(scored: &[(usize, f64)]) -> HashMap<usize, usize> {
    let mut sorted: Vec<(usize, f64)> = scored.to_vec();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, (idx, _))| (idx, rank))
        .collect()
}

#[async_trait]
impl VectorEngine for MemoryEngine {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .collections
            .read()
            .expect("engine lock poisoned")
            .contains_key(name))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        if schema.dense_dimension == 0 {
            return Err(Error::Schema("dense dimension must be > 0".into()));
        }
        let mut collections = self.collections.write().expect("engine lock poisoned");
        if collections.contains_key(&schema.name) {
            return Err(Error::engine(format!(
                "collection '{}' already exists",
                schema.name
            )));
        }
        collections.insert(
            schema.name.clone(),
            MemCollection {
                schema: schema.clone(),
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn upsert_points(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        let mut collections = self.collections.write().expect("engine lock poisoned");
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::engine(format!("collection '{collection}' not found")))?;

        for point in &points {
            if point.dense.len() != coll.schema.dense_dimension {
                return Err(Error::Schema(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.dense.len(),
                    coll.schema.dense_dimension
                )));
            }
            if point.sparse.is_some() && !coll.schema.has_sparse {
                return Err(Error::Schema(
                    "sparse vector supplied but collection has no sparse slot".into(),
                ));
            }
        }
        coll.points.extend(points);
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().expect("engine lock poisoned");
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| Error::engine(format!("collection '{collection}' not found")))?;
        coll.points.retain(|p| !ids.contains(&p.id));
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &Filter,
        limit: usize,
        offset: Option<Value>,
        with_payload: bool,
    ) -> Result<ScrollPage> {
        let collections = self.collections.read().expect("engine lock poisoned");
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::engine(format!("collection '{collection}' not found")))?;

        let start = offset
            .as_ref()
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(0);

        let matching: Vec<&PointRecord> = coll
            .points
            .iter()
            .filter(|p| matches_filter(&p.payload, filter))
            .collect();

        let page: Vec<ScrolledPoint> = matching
            .iter()
            .skip(start)
            .take(limit)
            .map(|p| ScrolledPoint {
                id: p.id.clone(),
                payload: with_payload.then(|| p.payload.clone()),
            })
            .collect();

        let consumed = start + page.len();
        let next_offset = (consumed < matching.len()).then(|| Value::from(consumed as u64));

        Ok(ScrollPage {
            points: page,
            next_offset,
        })
    }

    async fn query(
        &self,
        collection: &str,
        query: &QueryVector,
        filter: &Filter,
        top_k: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().expect("engine lock poisoned");
        let coll = collections
            .get(collection)
            .ok_or_else(|| Error::engine(format!("collection '{collection}' not found")))?;

        let candidates: Vec<(usize, &PointRecord)> = coll
            .points
            .iter()
            .enumerate()
            .filter(|(_, p)| matches_filter(&p.payload, filter))
            .collect();

        let mut scored: Vec<ScoredPoint> = match query {
            QueryVector::Dense(dense) => candidates
                .iter()
                .map(|(_, p)| ScoredPoint {
                    id: p.id.clone(),
                    score: dense_score(coll.schema.distance, dense, &p.dense),
                    payload: p.payload.clone(),
                })
                .collect(),
            QueryVector::Hybrid { dense, sparse } => {
                if !coll.schema.has_sparse {
                    return Err(Error::Schema(
                        "hybrid query against a collection with no sparse slot".into(),
                    ));
                }
                let dense_scored: Vec<(usize, f64)> = candidates
                    .iter()
                    .map(|(i, p)| (*i, dense_score(coll.schema.distance, dense, &p.dense)))
                    .collect();
                let sparse_scored: Vec<(usize, f64)> = candidates
                    .iter()
                    .map(|(i, p)| {
                        let s = p
                            .sparse
                            .as_ref()
                            .map(|sv| sparse_score(sparse, sv))
                            .unwrap_or(0.0);
                        (*i, s)
                    })
                    .collect();
                let dense_ranks = ranks(&dense_scored);
                let sparse_ranks = ranks(&sparse_scored);

                candidates
                    .iter()
                    .map(|(i, p)| {
                        let rd = dense_ranks.get(i).copied().unwrap_or(usize::MAX);
                        let rs = sparse_ranks.get(i).copied().unwrap_or(usize::MAX);
                        let score = 1.0 / (RRF_K + rd as f64 + 1.0)
                            + 1.0 / (RRF_K + rs as f64 + 1.0);
                        ScoredPoint {
                            id: p.id.clone(),
                            score,
                            payload: p.payload.clone(),
                        }
                    })
                    .collect()
            }
        };

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}
