//! # Policy Index CLI (`pix`)
//!
//! The `pix` binary is the primary interface for Policy Index. It provides
//! commands for collection initialization, corpus ingestion, semantic
//! search, and metadata browsing.
//!
//! ## Usage
//!
//! ```bash
//! pix --config ./config/pix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pix init` | Create the vector collection with the configured schema |
//! | `pix ingest` | Chunk, embed, and index the markdown corpus |
//! | `pix search "<query>"` | Search indexed policy chunks |
//! | `pix browse` | List chunks by metadata filters, no query needed |
//!
//! ## Examples
//!
//! ```bash
//! # Create the collection
//! pix init --config ./config/pix.toml
//!
//! # Index the corpus
//! pix ingest --config ./config/pix.toml
//!
//! # Preview without writing anything
//! pix ingest --dry-run
//!
//! # Dense semantic search
//! pix search "is medical evacuation covered abroad"
//!
//! # Hybrid search scoped to one insurer
//! pix search "deductible" --mode hybrid --organization "Goudse"
//!
//! # Browse one section of one document
//! pix browse --organization "Goudse" --header "Coverage"
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use policy_index::collection::ensure_collection;
use policy_index::config::{self, Config};
use policy_index::embedding::{create_dense, create_sparse};
use policy_index::engine_qdrant::QdrantEngine;
use policy_index::ingest::{run_ingestion, IngestOptions, IngestReport};
use policy_index::retrieve::{RetrievalFilters, RetrievalMode, Retriever};
use policy_index::models::RetrievalResult;

/// Policy Index CLI — a markdown policy corpus indexed for semantic
/// retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pix",
    about = "Policy Index — semantic search over a markdown policy corpus",
    version,
    long_about = "Policy Index ingests a directory of markdown policy documents, splits them \
    along their header structure, embeds the chunks, and serves filtered semantic search \
    (dense or hybrid dense+sparse) over a vector store."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pix.toml`. All engine, collection, embedding,
    /// and corpus settings are read from this file.
    #[arg(long, global = true, default_value = "./config/pix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the vector collection.
    ///
    /// Ensures a collection with the configured name, dimension, and
    /// vector slots exists on the engine. Idempotent — running it against
    /// an existing collection is a no-op.
    Init,

    /// Ingest the markdown corpus.
    ///
    /// Loads every matching file under the corpus root, splits it along
    /// markdown headers, purges previously indexed chunks per document,
    /// embeds the new chunks, and writes them to the collection. Running
    /// it twice over the same corpus leaves no duplicates.
    Ingest {
        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Also write chunks as plain text files under this directory.
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Search indexed policy chunks.
    ///
    /// Embeds the query, runs a filtered nearest-neighbor search, and
    /// prints ranked results with normalized scores in [0, 1].
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `dense` (vector only) or `hybrid` (dense + sparse
        /// fused by the engine). Defaults to the configured mode.
        #[arg(long)]
        mode: Option<String>,

        /// Restrict results to one organization.
        #[arg(long)]
        organization: Option<String>,

        /// Restrict results to one document by filename.
        #[arg(long)]
        document: Option<String>,

        /// Restrict results to one top-level section by its header text.
        #[arg(long)]
        header: Option<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results scoring below this similarity (0.0 to 1.0).
        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Browse chunks by metadata, without a query.
    ///
    /// Lists chunks matching the given filters in index order. At least
    /// one filter is required.
    Browse {
        /// Filter by organization.
        #[arg(long)]
        organization: Option<String>,

        /// Filter by document filename.
        #[arg(long)]
        document: Option<String>,

        /// Filter by top-level header text.
        #[arg(long)]
        header: Option<String>,

        /// Maximum number of chunks to list.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let engine = QdrantEngine::new(&cfg.engine)?;

    match cli.command {
        Commands::Init => {
            ensure_collection(&engine, &cfg.collection.schema()).await?;
            println!("Collection '{}' ready.", cfg.collection.name);
        }

        Commands::Ingest {
            dry_run,
            limit,
            dump,
        } => {
            // A dry run only loads and chunks, so providers are not needed.
            let (dense, sparse) = if dry_run {
                (None, None)
            } else {
                let dense = create_dense(&cfg.embedding)
                    .context("ingestion requires an embedding provider")?;
                (Some(dense), create_sparse(&cfg.sparse)?)
            };

            let options = IngestOptions {
                dry_run,
                limit,
                dump_dir: dump,
            };
            let report = run_ingestion(
                &engine,
                &cfg,
                dense.as_deref(),
                sparse.as_deref(),
                &options,
            )
            .await?;
            print_ingest_report(&report);
        }

        Commands::Search {
            query,
            mode,
            organization,
            document,
            header,
            top_k,
            min_score,
        } => {
            let dense =
                create_dense(&cfg.embedding).context("search requires an embedding provider")?;
            let sparse = create_sparse(&cfg.sparse)?;

            let mode = parse_mode(mode.as_deref().unwrap_or(&cfg.retrieval.mode))?;
            let schema = cfg.collection.schema();
            let retriever = Retriever::new(
                &engine,
                Some(dense.as_ref()),
                sparse.as_deref(),
                &schema,
                mode,
                min_score.unwrap_or(cfg.retrieval.min_score),
            )?;

            let filters = RetrievalFilters {
                organization,
                document_name: document,
                header_1: header,
            };
            let results = retriever
                .retrieve(&query, &filters, top_k.unwrap_or(cfg.retrieval.top_k))
                .await?;
            print_results(&results, true);
        }

        Commands::Browse {
            organization,
            document,
            header,
            limit,
        } => {
            let schema = cfg.collection.schema();
            // Browsing never embeds, so no provider is needed here.
            let retriever =
                Retriever::new(&engine, None, None, &schema, RetrievalMode::Dense, 0.0)?;

            let filters = RetrievalFilters {
                organization,
                document_name: document,
                header_1: header,
            };
            let results = retriever.retrieve_by_metadata(&filters, limit).await?;
            print_results(&results, false);
        }
    }

    Ok(())
}

fn parse_mode(mode: &str) -> anyhow::Result<RetrievalMode> {
    match mode {
        "dense" => Ok(RetrievalMode::Dense),
        "hybrid" => Ok(RetrievalMode::Hybrid),
        other => anyhow::bail!("unknown search mode '{other}': use dense or hybrid"),
    }
}

fn print_ingest_report(report: &IngestReport) {
    if report.dry_run {
        println!("ingest (dry-run)");
        println!("  documents found: {}", report.documents.len());
        println!("  estimated chunks: {}", report.total_chunks());
        return;
    }

    println!("ingest");
    println!("  documents: {}", report.documents.len());
    println!("  chunks purged: {}", report.purged);
    println!("  chunks written: {}", report.indexed_chunks);
    for doc in &report.documents {
        match &doc.error {
            None => println!(
                "  {} ({}): {} chunks",
                doc.display_name, doc.organization, doc.chunks
            ),
            Some(error) => println!("  {} FAILED: {}", doc.display_name, error),
        }
    }
    for id in &report.purge_failures {
        println!("  warning: purge failed for document {id}; stale chunks may remain");
    }
    if report.failed_documents() == 0 && report.purge_failures.is_empty() {
        println!("ok");
    }
}

fn print_results(results: &[RetrievalResult], with_scores: bool) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        if with_scores {
            println!(
                "{}. [{:.2}] {} / {}",
                i + 1,
                result.score,
                result.payload.organization,
                result.payload.document_name
            );
        } else {
            println!(
                "{}. {} / {}",
                i + 1,
                result.payload.organization,
                result.payload.document_name
            );
        }
        for (key, value) in &result.payload.headers {
            println!("    {}: {}", key, value);
        }
        println!("    excerpt: \"{}\"", excerpt(&result.text));
        println!();
    }
}

/// One-line excerpt, capped at 200 characters on a char boundary.
fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= 200 {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(200).collect();
    format!("{cut}…")
}
