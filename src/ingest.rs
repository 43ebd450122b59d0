//! End-to-end ingestion pipeline.
//!
//! One run loads the markdown corpus, chunks it by headers, ensures the
//! collection exists, purges every document about to be re-indexed, and
//! writes the new chunks. Running the same corpus twice leaves exactly
//! one copy of each chunk: the purge before the write is what makes
//! ingestion idempotent.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunker::{default_rules, split_headers};
use crate::collection::ensure_collection;
use crate::config::Config;
use crate::dedup;
use crate::dump::dump_chunks;
use crate::embedding::{DenseEmbedder, SparseEmbedder};
use crate::engine::VectorEngine;
use crate::error::{Error, Result};
use crate::identity::{organization_from_filename, stable_id};
use crate::index::upsert_chunks;
use crate::models::{Chunk, Document};

/// Per-run knobs supplied by the CLI, not the config file.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Load and chunk but write nothing to the engine or dump dir.
    pub dry_run: bool,
    /// Only ingest the first N documents (corpus order).
    pub limit: Option<usize>,
    /// Override the configured dump directory.
    pub dump_dir: Option<PathBuf>,
}

/// Outcome for one document.
#[derive(Debug)]
pub struct DocumentReport {
    pub display_name: String,
    pub organization: String,
    pub chunks: usize,
    /// `None` means the document was indexed (or would be, on a dry run).
    pub error: Option<String>,
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<DocumentReport>,
    pub purged: usize,
    pub purge_failures: Vec<String>,
    pub indexed_chunks: usize,
    pub dry_run: bool,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.documents.iter().map(|d| d.chunks).sum()
    }

    pub fn failed_documents(&self) -> usize {
        self.documents.iter().filter(|d| d.error.is_some()).count()
    }
}

/// Load the corpus from disk: every file under the corpus root matching
/// the include globs, in deterministic path order.
pub fn load_documents(config: &Config) -> Result<Vec<Document>> {
    let root = &config.corpus.root;
    if !root.exists() {
        return Err(Error::config(format!(
            "corpus root does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.corpus.include_globs)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| Error::config(format!("failed to walk corpus: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !include_set.is_match(relative) {
            continue;
        }

        let raw_text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let source_path = path.to_string_lossy().to_string();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        documents.push(Document {
            stable_id: stable_id(&source_path),
            organization: organization_from_filename(
                &display_name,
                &config.corpus.organization_suffix,
            ),
            source_path,
            display_name,
            raw_text,
            ingested_at: Utc::now(),
        });
    }

    // Sort for deterministic ordering
    documents.sort_by(|a, b| a.source_path.cmp(&b.source_path));

    Ok(documents)
}

/// Split one document into chunks carrying its full provenance.
pub fn chunk_document(document: &Document, max_header_depth: u8) -> Vec<Chunk> {
    let rules = default_rules(max_header_depth);
    split_headers(&document.raw_text, &rules)
        .into_iter()
        .map(|section| Chunk {
            text: section.text,
            document_id: document.stable_id.clone(),
            organization: document.organization.clone(),
            document_name: document.display_name.clone(),
            source_path: document.source_path.clone(),
            ingested_at: document.ingested_at,
            header_path: section.header_path,
        })
        .collect()
}

/// Run the full pipeline. A document whose embedding fails is skipped
/// with its error recorded; engine failures outside the purge abort the
/// run. The dense embedder is only required on the write path: a dry run
/// loads and chunks without one.
pub async fn run_ingestion(
    engine: &dyn VectorEngine,
    config: &Config,
    dense: Option<&dyn DenseEmbedder>,
    sparse: Option<&dyn SparseEmbedder>,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let mut documents = load_documents(config)?;
    if let Some(limit) = options.limit {
        documents.truncate(limit);
    }
    info!(documents = documents.len(), "loaded corpus");

    let mut report = IngestReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let chunked: Vec<(Document, Vec<Chunk>)> = documents
        .into_iter()
        .map(|doc| {
            let chunks = chunk_document(&doc, config.chunking.max_header_depth);
            (doc, chunks)
        })
        .collect();

    if options.dry_run {
        for (doc, chunks) in &chunked {
            report.documents.push(DocumentReport {
                display_name: doc.display_name.clone(),
                organization: doc.organization.clone(),
                chunks: chunks.len(),
                error: None,
            });
        }
        return Ok(report);
    }

    let dense = dense.ok_or_else(|| {
        Error::config("indexing requires an embedding provider; set [embedding] provider in config")
    })?;

    let schema = config.collection.schema();
    ensure_collection(engine, &schema).await?;

    let dump_dir = options
        .dump_dir
        .clone()
        .or_else(|| config.dump.as_ref().map(|d| d.dir.clone()));
    if let Some(dir) = dump_dir {
        let all: Vec<Chunk> = chunked.iter().flat_map(|(_, c)| c.iter().cloned()).collect();
        dump_chunks(&dir, &all)?;
    }

    // Purge everything about to be re-indexed in one pass, before any
    // writes, so a partial failure never leaves duplicates.
    let ids: BTreeSet<String> = chunked.iter().map(|(d, _)| d.stable_id.clone()).collect();
    let purge_report = dedup::purge(engine, &schema.name, &ids).await;
    report.purged = purge_report.removed;
    report.purge_failures = purge_report.failed;

    for (doc, chunks) in chunked {
        let outcome = upsert_chunks(
            engine,
            &schema,
            dense,
            sparse,
            &chunks,
            config.embedding.batch_size,
        )
        .await;

        match outcome {
            Ok(written) => {
                report.indexed_chunks += written;
                report.documents.push(DocumentReport {
                    display_name: doc.display_name,
                    organization: doc.organization,
                    chunks: chunks.len(),
                    error: None,
                });
            }
            Err(e @ Error::Embedding(_)) => {
                // One document's embedding failure should not abort the
                // rest of the batch.
                warn!(document = %doc.display_name, error = %e, "skipping document");
                report.documents.push(DocumentReport {
                    display_name: doc.display_name,
                    organization: doc.organization,
                    chunks: chunks.len(),
                    error: Some(e.to_string()),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        indexed = report.indexed_chunks,
        purged = report.purged,
        failed = report.failed_documents(),
        "ingestion complete"
    );

    Ok(report)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::config(format!("invalid include glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build glob set: {e}")))
}
