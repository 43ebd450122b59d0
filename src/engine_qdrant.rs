//! Qdrant HTTP implementation of [`VectorEngine`].
//!
//! Talks to the Qdrant REST API with `reqwest`. Dense vectors live in a
//! named slot `"dense"`, sparse vectors in `"sparse"`. Requests honor the
//! configured timeout and are retried with exponential backoff on
//! rate-limit (429), server error (5xx), and transport failures; other
//! client errors fail immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::engine::{
    Filter, PointRecord, QueryVector, ScoredPoint, ScrollPage, ScrolledPoint, VectorEngine,
};
use crate::error::{Error, Result};
use crate::models::CollectionSchema;

/// Named vector slot for dense embeddings.
pub const DENSE_VECTOR_NAME: &str = "dense";
/// Named vector slot for sparse embeddings.
pub const SPARSE_VECTOR_NAME: &str = "sparse";

pub struct QdrantEngine {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl QdrantEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::engine(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request with retry/backoff, returning the parsed `result`
    /// field of the response envelope.
    async fn send(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.request(method.clone(), self.url(path));
            if let Some(b) = body {
                request = request.json(b);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let envelope: Value = response.json().await.map_err(|e| {
                            Error::engine(format!("invalid response from engine: {e}"))
                        })?;
                        return Ok(envelope.get("result").cloned().unwrap_or(Value::Null));
                    }

                    let text = response.text().await.unwrap_or_default();

                    // Rate limited or server error — retry.
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::engine(format!("engine error {status}: {text}")));
                        continue;
                    }

                    // Other client errors — don't retry. Bad-request on
                    // collection creation means the schema was rejected.
                    if status.as_u16() == 400 && path.starts_with("/collections") && body.is_some()
                    {
                        return Err(Error::Schema(format!("engine rejected request: {text}")));
                    }
                    return Err(Error::engine(format!("engine error {status}: {text}")));
                }
                Err(e) => {
                    // Timeouts and transport failures are retryable.
                    last_err = Some(Error::engine(format!("engine request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::engine("engine request failed after retries")))
    }
}

fn filter_json(filter: &Filter) -> Option<Value> {
    if filter.is_empty() {
        return None;
    }
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|cond| json!({ "key": cond.key, "match": { "value": cond.value } }))
        .collect();
    Some(json!({ "must": must }))
}

fn point_id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorEngine for QdrantEngine {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let result = self
            .send(
                reqwest::Method::GET,
                &format!("/collections/{name}/exists"),
                None,
            )
            .await?;
        Ok(result
            .get("exists")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let mut body = json!({
            "vectors": {
                DENSE_VECTOR_NAME: {
                    "size": schema.dense_dimension,
                    "distance": schema.distance.as_engine_str(),
                }
            }
        });
        if schema.has_sparse {
            body["sparse_vectors"] = json!({ SPARSE_VECTOR_NAME: {} });
        }

        self.send(
            reqwest::Method::PUT,
            &format!("/collections/{}", schema.name),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn upsert_points(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        let points_json: Vec<Value> = points
            .into_iter()
            .map(|p| {
                let mut vector = json!({ DENSE_VECTOR_NAME: p.dense });
                if let Some(sparse) = p.sparse {
                    vector[SPARSE_VECTOR_NAME] = json!({
                        "indices": sparse.indices,
                        "values": sparse.values,
                    });
                }
                json!({ "id": p.id, "vector": vector, "payload": p.payload })
            })
            .collect();

        self.send(
            reqwest::Method::PUT,
            &format!("/collections/{collection}/points?wait=true"),
            Some(&json!({ "points": points_json })),
        )
        .await?;
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<()> {
        self.send(
            reqwest::Method::POST,
            &format!("/collections/{collection}/points/delete?wait=true"),
            Some(&json!({ "points": ids })),
        )
        .await?;
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
        let mut body = json!({
            "limit": limit,
            "with_payload": with_payload,
            "with_vector": false,
        });
        if let Some(f) = filter_json(filter) {
            body["filter"] = f;
        }
        if let Some(o) = offset {
            body["offset"] = o;
        }

        let result = self
            .send(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/scroll"),
                Some(&body),
            )
            .await?;

        let points = result
            .get("points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .map(|p| ScrolledPoint {
                        id: p.get("id").map(point_id_string).unwrap_or_default(),
                        payload: p.get("payload").filter(|v| !v.is_null()).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let next_offset = result
            .get("next_page_offset")
            .filter(|v| !v.is_null())
            .cloned();

        Ok(ScrollPage {
            points,
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
        let filter_value = filter_json(filter);
        let mut body = match query {
            QueryVector::Dense(dense) => json!({
                "query": dense,
                "using": DENSE_VECTOR_NAME,
                "limit": top_k,
                "with_payload": true,
            }),
            QueryVector::Hybrid { dense, sparse } => {
                let mut dense_prefetch = json!({
                    "query": dense,
                    "using": DENSE_VECTOR_NAME,
                    "limit": top_k,
                });
                let mut sparse_prefetch = json!({
                    "query": { "indices": sparse.indices, "values": sparse.values },
                    "using": SPARSE_VECTOR_NAME,
                    "limit": top_k,
                });
                if let Some(ref f) = filter_value {
                    dense_prefetch["filter"] = f.clone();
                    sparse_prefetch["filter"] = f.clone();
                }
                json!({
                    "prefetch": [dense_prefetch, sparse_prefetch],
                    "query": { "fusion": "rrf" },
                    "limit": top_k,
                    "with_payload": true,
                })
            }
        };
        if let Some(f) = filter_value {
            body["filter"] = f;
        }

        let result = self
            .send(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/query"),
                Some(&body),
            )
            .await?;

        let hits = result
            .get("points")
            .and_then(Value::as_array)
            .map(|points| {
                points
                    .iter()
                    .map(|p| ScoredPoint {
                        id: p.get("id").map(point_id_string).unwrap_or_default(),
                        score: p.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                        payload: p.get("payload").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }
}
