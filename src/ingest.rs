//! Ingestion pipeline orchestration.
//!
//! Three sequential stages per scope, each independently invocable for
//! partial re-runs: CHUNK (load + split + persist the chunk archive),
//! EMBED (build the vector index), GRAPH (extract triples and merge them
//! into the graph). Zero new chunks short-circuits the later stages as a
//! no-op completion. Graph failures never roll back chunk or embed
//! results — graph enrichment is best-effort, vector retrieval is primary.

use anyhow::Result;
use clap::ValueEnum;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::chunk::split_into_chunks;
use crate::config::Config;
use crate::dedup::Ledger;
use crate::graph::GraphStore;
use crate::llm::LlmClient;
use crate::loader::{load_new_documents, ReaderRegistry};
use crate::models::Chunk;
use crate::triples::TripleExtractor;
use crate::vector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Load new documents, split, persist the chunk archive.
    Chunk,
    /// Rebuild the scope's vector index from the chunk archive.
    Embed,
    /// Extract triples from the chunk archive and merge into the graph.
    Graph,
    /// Full pipeline: chunk, then embed, then graph over the new chunks.
    All,
}

/// Per-scope ingestion summary.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub scope: String,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_unsupported: usize,
    pub files_failed: usize,
    pub chunks_written: usize,
    pub vectors_written: usize,
    pub triples_upserted: usize,
    /// Graph stage failure, if any. Never fails the ingestion call.
    pub graph_error: Option<String>,
}

impl IngestReport {
    pub fn print_summary(&self) {
        println!("ingest {}", self.scope);
        println!("  files loaded: {}", self.files_loaded);
        println!("  files skipped (already ingested): {}", self.files_skipped);
        if self.files_unsupported > 0 {
            println!("  files skipped (unsupported): {}", self.files_unsupported);
        }
        if self.files_failed > 0 {
            println!("  files failed: {}", self.files_failed);
        }
        println!("  chunks written: {}", self.chunks_written);
        println!("  vectors written: {}", self.vectors_written);
        println!("  triples upserted: {}", self.triples_upserted);
        match &self.graph_error {
            Some(e) => println!("  graph stage failed (ingestion still ok): {}", e),
            None => println!("ok"),
        }
    }
}

/// Run the requested stage(s) for one scope.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    scope: &str,
    stage: Stage,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        scope: scope.to_string(),
        ..Default::default()
    };

    match stage {
        Stage::Chunk => {
            run_chunk_stage(config, pool, scope, &mut report).await?;
        }
        Stage::Embed => {
            let archive = load_chunk_archive(pool, scope).await?;
            report.vectors_written =
                vector::build_index(pool, &config.embedding, scope, &archive).await?;
        }
        Stage::Graph => {
            let archive = load_chunk_archive(pool, scope).await?;
            run_graph_stage(config, pool, scope, &archive, &mut report).await;
        }
        Stage::All => {
            let new_chunks = run_chunk_stage(config, pool, scope, &mut report).await?;
            if new_chunks.is_empty() {
                info!(scope, "no new documents, skipping embed and graph stages");
                return Ok(report);
            }

            let archive = load_chunk_archive(pool, scope).await?;
            report.vectors_written =
                vector::build_index(pool, &config.embedding, scope, &archive).await?;

            // Only the chunks created in this run; re-extracting the whole
            // scope on every incremental ingest would be wasteful.
            run_graph_stage(config, pool, scope, &new_chunks, &mut report).await;
        }
    }

    Ok(report)
}

/// CHUNK: load new documents through the ledger, split, and persist.
/// Returns the chunks created in this run.
async fn run_chunk_stage(
    config: &Config,
    pool: &SqlitePool,
    scope: &str,
    report: &mut IngestReport,
) -> Result<Vec<Chunk>> {
    let mut ledger = Ledger::load(&config.ledger_path())?;
    let registry = ReaderRegistry::with_defaults();

    let outcome = load_new_documents(config, &mut ledger, &registry, scope)?;
    report.files_loaded = outcome.units.len();
    report.files_skipped = outcome.skipped_ingested;
    report.files_unsupported = outcome.skipped_unsupported;
    report.files_failed = outcome.failed;

    if outcome.units.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = split_into_chunks(
        &outcome.units,
        scope,
        config.chunking.chunk_size,
        config.chunking.overlap,
    );
    persist_chunks(pool, scope, &chunks).await?;
    report.chunks_written = chunks.len();

    Ok(chunks)
}

/// Persist chunks, replacing any previous chunks of the same files (a
/// re-ingested file carries a new digest and supersedes its old windows).
async fn persist_chunks(pool: &SqlitePool, scope: &str, chunks: &[Chunk]) -> Result<()> {
    let mut files: Vec<&str> = chunks.iter().map(|c| c.source_file.as_str()).collect();
    files.sort_unstable();
    files.dedup();

    let mut tx = pool.begin().await?;

    for file in files {
        sqlx::query(
            r#"
            DELETE FROM chunk_vectors WHERE chunk_id IN
                (SELECT id FROM chunks WHERE scope = ? AND source_file = ?)
            "#,
        )
        .bind(scope)
        .bind(file)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM chunks WHERE scope = ? AND source_file = ?")
            .bind(scope)
            .bind(file)
            .execute(&mut *tx)
            .await?;
    }

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, scope, source_file, chunk_index, start_offset, text)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.scope)
        .bind(&chunk.source_file)
        .bind(chunk.chunk_index)
        .bind(chunk.offset)
        .bind(&chunk.text)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// GRAPH: extract triples per chunk and merge them. Failures are recorded
/// in the report, never propagated.
async fn run_graph_stage(
    config: &Config,
    pool: &SqlitePool,
    scope: &str,
    chunks: &[Chunk],
    report: &mut IngestReport,
) {
    let llm = match LlmClient::new(&config.llm) {
        Ok(llm) => llm,
        Err(e) => {
            warn!(scope, error = %e, "graph stage skipped");
            report.graph_error = Some(e.to_string());
            return;
        }
    };

    let model = config
        .llm
        .extraction_model
        .clone()
        .unwrap_or_else(|| config.llm.model.clone());
    let extractor = TripleExtractor::new(&llm, &model, config.llm.max_retries, config.llm.backoff_ms);
    let graph = GraphStore::new(pool.clone());

    info!(scope, chunks = chunks.len(), "building graph");

    for chunk in chunks {
        let triples = extractor.extract(&chunk.text, scope).await;
        for triple in &triples {
            match graph.upsert_triple(triple).await {
                Ok(()) => report.triples_upserted += 1,
                Err(e) => {
                    warn!(scope, error = %e, "graph upsert failed");
                    report.graph_error = Some(e.to_string());
                }
            }
        }
    }
}

/// The scope's full chunk archive, in (file, index) order.
pub async fn load_chunk_archive(pool: &SqlitePool, scope: &str) -> Result<Vec<Chunk>> {
    use sqlx::Row;

    let rows = sqlx::query(
        r#"
        SELECT id, scope, source_file, chunk_index, start_offset, text
        FROM chunks WHERE scope = ?
        ORDER BY source_file, chunk_index
        "#,
    )
    .bind(scope)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Chunk {
            id: row.get("id"),
            scope: row.get("scope"),
            source_file: row.get("source_file"),
            chunk_index: row.get("chunk_index"),
            offset: row.get("start_offset"),
            text: row.get("text"),
        })
        .collect())
}
