//! Error taxonomy for the ingestion and retrieval paths.
//!
//! Failures that must abort a run (bad configuration, schema rejection)
//! are distinct from failures scoped to one unit of work (an embedding
//! batch) and from caller mistakes (an unconstrained metadata scan).
//! Purge failures are deliberately *not* represented here: partial
//! deduplication is reported as a warning in the purge report and the
//! run continues.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal before any writes.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The vector engine rejected the requested collection schema,
    /// or an existing collection does not match the declared schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// The embedding capability failed for a batch of texts.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A vector engine request failed after retries.
    #[error("vector engine error: {0}")]
    Engine(String),

    /// A retrieval call with insufficient constraints. Returned to the
    /// caller, never retried.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Error::Engine(msg.into())
    }
}
