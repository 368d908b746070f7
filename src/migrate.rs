use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Chunk archive, one row per window, namespaced by scope.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            scope TEXT NOT NULL,
            source_file TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_offset INTEGER NOT NULL,
            text TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-scope vector index: f32 little-endian blobs, one per chunk.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            scope TEXT NOT NULL,
            model TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Graph entities are shared across scopes; created_scope is metadata
    // only, never an exclusivity constraint.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            name TEXT PRIMARY KEY,
            created_scope TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Relationships are scope-tagged; the uniqueness constraint makes
    // triple upserts idempotent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relations (
            subject TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object TEXT NOT NULL,
            scope TEXT NOT NULL,
            UNIQUE(subject, predicate, object, scope),
            FOREIGN KEY (subject) REFERENCES entities(name),
            FOREIGN KEY (object) REFERENCES entities(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_scope ON chunks(scope)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_scope_file ON chunks(scope, source_file)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_vectors_scope ON chunk_vectors(scope)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_relations_scope ON relations(scope)")
        .execute(pool)
        .await?;

    Ok(())
}
