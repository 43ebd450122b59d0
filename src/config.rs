//! TOML configuration for the pipeline and query engine.
//!
//! All settings live in one explicit [`Config`] value passed into each
//! component at construction time — never module-level globals — so tests
//! can run against an ephemeral collection with their own models and
//! dimensions.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::{CollectionSchema, Distance, ScoreKind};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub collection: CollectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sparse: SparseConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub corpus: CorpusConfig,
    /// Optional chunk dump directory for human inspection.
    #[serde(default)]
    pub dump: Option<DumpConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Qdrant HTTP endpoint, e.g. `http://localhost:6333`.
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub name: String,
    pub dense_dimension: usize,
    #[serde(default = "default_distance")]
    pub distance: Distance,
    /// Create a parallel sparse vector slot for hybrid retrieval.
    #[serde(default)]
    pub sparse: bool,
    /// How the engine reports raw scores for this collection. Declared
    /// here rather than guessed from the values at query time.
    #[serde(default = "default_score_kind")]
    pub score_kind: ScoreKind,
}

impl CollectionConfig {
    pub fn schema(&self) -> CollectionSchema {
        CollectionSchema {
            name: self.name.clone(),
            dense_dimension: self.dense_dimension,
            distance: self.distance,
            has_sparse: self.sparse,
            score_kind: self.score_kind,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SparseConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
        }
    }
}

impl SparseConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Deepest header level that starts a new chunk (1..=6).
    #[serde(default = "default_max_header_depth")]
    pub max_header_depth: u8,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_header_depth: default_max_header_depth(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Dense-mode results scoring below this similarity are dropped.
    /// 0.0 = keep all. Hybrid fused scores are rank-based and exempt.
    #[serde(default)]
    pub min_score: f64,
    /// `dense` or `hybrid`.
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            mode: default_mode(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory containing the markdown corpus.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Filename suffix stripped when deriving the organization name.
    #[serde(default = "default_organization_suffix")]
    pub organization_suffix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DumpConfig {
    pub dir: PathBuf,
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_distance() -> Distance {
    Distance::Cosine
}
fn default_score_kind() -> ScoreKind {
    ScoreKind::Similarity
}
fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_header_depth() -> u8 {
    5
}
fn default_top_k() -> usize {
    5
}
fn default_mode() -> String {
    "dense".to_string()
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_organization_suffix() -> String {
    "_policy.md".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {e}", path.display()))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| Error::config(format!("failed to parse config file: {e}")))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.collection.dense_dimension == 0 {
        return Err(Error::config("collection.dense_dimension must be > 0"));
    }

    if config.chunking.max_header_depth == 0 || config.chunking.max_header_depth > 6 {
        return Err(Error::config("chunking.max_header_depth must be in 1..=6"));
    }

    if config.retrieval.top_k == 0 {
        return Err(Error::config("retrieval.top_k must be >= 1"));
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        return Err(Error::config("retrieval.min_score must be in [0.0, 1.0]"));
    }

    match config.retrieval.mode.as_str() {
        "dense" | "hybrid" => {}
        other => {
            return Err(Error::config(format!(
                "unknown retrieval mode '{other}': use dense or hybrid"
            )))
        }
    }

    if config.retrieval.mode == "hybrid" {
        if !config.collection.sparse {
            return Err(Error::config(
                "retrieval.mode = hybrid requires collection.sparse = true",
            ));
        }
        if !config.sparse.is_enabled() {
            return Err(Error::config(
                "retrieval.mode = hybrid requires a sparse embedding provider",
            ));
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            return Err(Error::config(format!(
                "embedding.model must be set when provider is '{}'",
                config.embedding.provider
            )));
        }
        match config.embedding.dims {
            None | Some(0) => {
                return Err(Error::config(format!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                )))
            }
            Some(dims) if dims != config.collection.dense_dimension => {
                return Err(Error::config(format!(
                    "embedding.dims ({dims}) does not match collection.dense_dimension ({})",
                    config.collection.dense_dimension
                )))
            }
            Some(_) => {}
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => {
            return Err(Error::config(format!(
                "unknown embedding provider '{other}': use disabled or openai"
            )))
        }
    }

    match config.sparse.provider.as_str() {
        "disabled" | "fastembed" => {}
        other => {
            return Err(Error::config(format!(
                "unknown sparse provider '{other}': use disabled or fastembed"
            )))
        }
    }

    if config.corpus.organization_suffix.is_empty() {
        return Err(Error::config("corpus.organization_suffix must not be empty"));
    }

    Ok(())
}
