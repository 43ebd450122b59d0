//! Dense and sparse embedding providers.
//!
//! [`DenseEmbedder`] maps text to fixed-length vectors; [`SparseEmbedder`]
//! maps text to term-weight vectors for lexical matching. Both are trait
//! objects injected into the indexer and retriever so tests can run with
//! deterministic stubs.
//!
//! The OpenAI provider calls `POST /v1/embeddings` with batching and
//! exponential backoff: HTTP 429 and 5xx retry, other 4xx fail
//! immediately, transport errors retry. The sparse provider runs a local
//! fastembed model and is gated behind the `local-sparse` feature because
//! it pulls ONNX runtime binaries at build time.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::{EmbeddingConfig, SparseConfig};
use crate::error::{Error, Result};
use crate::models::SparseVector;

/// A capability mapping text to fixed-length dense vectors.
#[async_trait]
pub trait DenseEmbedder: Send + Sync {
    /// Model identifier, recorded for reporting.
    fn model_name(&self) -> &str;
    /// Vector dimensionality, checked against the collection schema.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A capability mapping text to sparse term-weight vectors.
#[async_trait]
pub trait SparseEmbedder: Send + Sync {
    fn model_name(&self) -> &str;
    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>>;
}

// ============ OpenAI dense provider ============

/// Dense embeddings from the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| Error::config("embedding.model required for the openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| Error::config("embedding.dims required for the openai provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::config("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl DenseEmbedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            Error::Embedding(format!("invalid embeddings response: {e}"))
                        })?;
                        return parse_openai_response(&json, texts.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Embedding(format!(
                            "embeddings API error {status}: {text}"
                        )));
                        continue;
                    }

                    let text = response.text().await.unwrap_or_default();
                    return Err(Error::Embedding(format!(
                        "embeddings API error {status}: {text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::Embedding(format!("embeddings request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Embedding("embedding failed after retries".to_string())))
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_openai_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Embedding("embeddings response missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Embedding("embeddings response missing vector".to_string()))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    if embeddings.len() != expected {
        return Err(Error::Embedding(format!(
            "embeddings response has {} vectors for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    Ok(embeddings)
}

/// Create the configured dense provider.
pub fn create_dense(config: &EmbeddingConfig) -> Result<Box<dyn DenseEmbedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "disabled" => Err(Error::config(
            "embedding provider is disabled; set [embedding] provider in config",
        )),
        other => Err(Error::config(format!("unknown embedding provider: {other}"))),
    }
}

// ============ Sparse provider ============

/// Sparse model supported by the fastembed provider.
#[cfg(feature = "local-sparse")]
const SPLADE_MODEL_NAME: &str = "prithivida/Splade_PP_en_v1";

/// Map a configured model name to the fastembed model it loads. Unknown
/// names are rejected here so the loaded model never diverges from what
/// the configuration (and `model_name()`) claims.
#[cfg(feature = "local-sparse")]
fn sparse_model_from_name(name: &str) -> Result<fastembed::SparseModel> {
    match name {
        SPLADE_MODEL_NAME => Ok(fastembed::SparseModel::SPLADEPPV1),
        other => Err(Error::config(format!(
            "unsupported sparse model '{other}': the fastembed provider supports {SPLADE_MODEL_NAME}"
        ))),
    }
}

/// Local sparse embeddings via fastembed.
#[cfg(feature = "local-sparse")]
pub struct FastembedSparse {
    model: std::sync::Arc<fastembed::SparseTextEmbedding>,
    model_name: String,
}

#[cfg(feature = "local-sparse")]
impl FastembedSparse {
    pub fn new(config: &SparseConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| SPLADE_MODEL_NAME.to_string());
        let model_kind = sparse_model_from_name(&model_name)?;
        let model = fastembed::SparseTextEmbedding::try_new(fastembed::SparseInitOptions::new(
            model_kind,
        ))
        .map_err(|e| Error::Embedding(format!("failed to load sparse model: {e}")))?;
        Ok(Self {
            model: std::sync::Arc::new(model),
            model_name,
        })
    }
}

#[cfg(feature = "local-sparse")]
#[async_trait]
impl SparseEmbedder for FastembedSparse {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let model = std::sync::Arc::clone(&self.model);
        let inputs: Vec<String> = texts.to_vec();
        // Inference is CPU-bound; keep it off the async workers.
        let embeddings = tokio::task::spawn_blocking(move || model.embed(inputs, None))
            .await
            .map_err(|e| Error::Embedding(format!("sparse embedding task failed: {e}")))?
            .map_err(|e| Error::Embedding(format!("sparse embedding failed: {e}")))?;
        Ok(embeddings
            .into_iter()
            .map(|e| SparseVector {
                indices: e.indices.iter().map(|i| *i as u32).collect(),
                values: e.values,
            })
            .collect())
    }
}

/// Create the configured sparse provider, or `None` when disabled.
pub fn create_sparse(config: &SparseConfig) -> Result<Option<Box<dyn SparseEmbedder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        #[cfg(feature = "local-sparse")]
        "fastembed" => Ok(Some(Box::new(FastembedSparse::new(config)?))),
        #[cfg(not(feature = "local-sparse"))]
        "fastembed" => Err(Error::config(
            "sparse provider 'fastembed' requires the local-sparse feature",
        )),
        other => Err(Error::config(format!("unknown sparse provider: {other}"))),
    }
}

// ============ Vector math ============

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
