//! Scope lifecycle: enumeration and full deletion.
//!
//! A scope exists when its raw directory does. Deletion tears down every
//! footprint a scope leaves behind: raw files, ledger entries, chunk
//! archive, vector rows, and graph edges (with the orphaned-entity pass).

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::dedup::Ledger;
use crate::graph::GraphStore;

/// Sorted scope names, taken from the directory names under `raw/`.
/// A missing raw root means no scope was ever created.
pub fn list_scopes(config: &Config) -> Result<Vec<String>> {
    let root = config.raw_root();
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut scopes = Vec::new();
    for entry in std::fs::read_dir(&root)
        .with_context(|| format!("failed to read scope directory {}", root.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            scopes.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    scopes.sort();
    Ok(scopes)
}

/// What a scope deletion removed, for the CLI summary.
#[derive(Debug, Default)]
pub struct ScopeDeletion {
    pub ledger_entries: usize,
    pub chunks: u64,
    pub vectors: u64,
}

/// Remove every trace of a scope: raw files, ledger entries, chunks,
/// vectors, and graph edges. Order matters only for the graph, where
/// relationships must go before the orphaned-entity pass.
pub async fn delete_scope(
    config: &Config,
    pool: &SqlitePool,
    scope: &str,
) -> Result<ScopeDeletion> {
    let mut deletion = ScopeDeletion::default();

    let raw_dir = config.raw_dir(scope);
    if raw_dir.exists() {
        std::fs::remove_dir_all(&raw_dir)
            .with_context(|| format!("failed to remove raw directory {}", raw_dir.display()))?;
    }

    let mut ledger = Ledger::load(&config.ledger_path())?;
    deletion.ledger_entries = ledger.remove_scope(scope)?;

    let vectors = sqlx::query("DELETE FROM chunk_vectors WHERE scope = ?")
        .bind(scope)
        .execute(pool)
        .await?;
    deletion.vectors = vectors.rows_affected();

    let chunks = sqlx::query("DELETE FROM chunks WHERE scope = ?")
        .bind(scope)
        .execute(pool)
        .await?;
    deletion.chunks = chunks.rows_affected();

    GraphStore::new(pool.clone()).delete_scope(scope).await?;

    info!(
        scope,
        ledger_entries = deletion.ledger_entries,
        chunks = deletion.chunks,
        vectors = deletion.vectors,
        "scope deleted"
    );
    Ok(deletion)
}
