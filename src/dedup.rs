//! Per-document purge before reinsertion.
//!
//! Deduplication is replace-by-document: before a document's new chunks
//! are written, every record carrying its `document_id` is removed. The
//! lookup is a paginated scroll followed by a bulk delete-by-id — a
//! two-phase sequence, because delete-by-filter semantics are not assumed
//! reliable across engines.
//!
//! A failed purge for one document is non-fatal: stale chunks left behind
//! are judged less harmful than aborting the whole ingestion batch. The
//! failure is logged and recorded in the [`PurgeReport`]; until the next
//! successful purge, old and new chunks for that document may coexist.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::engine::{Filter, VectorEngine};
use crate::error::Result;

/// Page cap for the lookup scroll. Documents routinely exceed one page,
/// so the scan always follows the continuation offset to the end.
const SCROLL_PAGE: usize = 256;

/// Outcome of one purge pass.
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Records removed across all documents.
    pub removed: usize,
    /// Document ids whose purge could not be confirmed.
    pub failed: Vec<String>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove all previously indexed records for each document id.
pub async fn purge(
    engine: &dyn VectorEngine,
    collection: &str,
    document_ids: &BTreeSet<String>,
) -> PurgeReport {
    let mut report = PurgeReport::default();

    for document_id in document_ids {
        match purge_one(engine, collection, document_id).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(document_id, removed, "purged stale records");
                }
                report.removed += removed;
            }
            Err(e) => {
                warn!(document_id, error = %e, "purge failed; stale chunks may remain");
                report.failed.push(document_id.clone());
            }
        }
    }

    report
}

async fn purge_one(
    engine: &dyn VectorEngine,
    collection: &str,
    document_id: &str,
) -> Result<usize> {
    let filter = Filter::equals("document_id", document_id);
    let mut record_ids = Vec::new();
    let mut offset = None;

    loop {
        let page = engine
            .scroll(collection, &filter, SCROLL_PAGE, offset, false)
            .await?;
        record_ids.extend(page.points.into_iter().map(|p| p.id));
        match page.next_offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    if record_ids.is_empty() {
        return Ok(0);
    }

    engine.delete_points(collection, &record_ids).await?;
    Ok(record_ids.len())
}
