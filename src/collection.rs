//! Collection bootstrap.

use tracing::info;

use crate::engine::VectorEngine;
use crate::error::{Error, Result};
use crate::models::CollectionSchema;

/// Ensure the target collection exists with the declared vector schema.
///
/// Idempotent: if a collection with the schema's name already exists this
/// is a no-op. The existing collection's schema is NOT verified against
/// the requested one — a mismatch only surfaces later as a dimension
/// error on upsert. Creation failures surface as [`Error::Schema`].
pub async fn ensure_collection(
    engine: &dyn VectorEngine,
    schema: &CollectionSchema,
) -> Result<()> {
    if schema.dense_dimension == 0 {
        return Err(Error::Schema("dense dimension must be > 0".into()));
    }

    if engine.collection_exists(&schema.name).await? {
        info!(collection = %schema.name, "collection already exists");
        return Ok(());
    }

    engine.create_collection(schema).await?;
    info!(
        collection = %schema.name,
        dimension = schema.dense_dimension,
        sparse = schema.has_sparse,
        "created collection"
    );
    Ok(())
}
