//! Per-scope vector index over SQLite.
//!
//! Building replaces the scope's vectors wholesale; searching embeds the
//! query and ranks the scope's stored vectors by cosine similarity. A
//! scope with no chunk archive at all is treated as a missing knowledge
//! base and is a hard error at search time.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::EmbeddingConfig;
use crate::embedding;
use crate::models::Chunk;

/// Embed `chunks` and replace the scope's vector rows. Returns the number
/// of vectors written.
pub async fn build_index(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    scope: &str,
    chunks: &[Chunk],
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(config.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        vectors.extend(embedding::embed_texts(config, &texts).await?);
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunk_vectors WHERE scope = ?")
        .bind(scope)
        .execute(&mut *tx)
        .await?;

    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
        sqlx::query(
            "INSERT INTO chunk_vectors (chunk_id, scope, model, embedding) VALUES (?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(scope)
        .bind(&config.model)
        .bind(embedding::vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(chunks.len())
}

/// Top-k chunk texts for `query` within `scope`, ranked by cosine
/// similarity.
///
/// An unknown scope (no chunks and no vectors) signals a missing or
/// corrupt knowledge base and fails hard. A known scope whose vector set
/// is empty returns an empty list, which the retriever folds into its
/// no-information short-circuit.
pub async fn search(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    scope: &str,
    query: &str,
    k: usize,
) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT cv.embedding, c.text
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        WHERE cv.scope = ?
        "#,
    )
    .bind(scope)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE scope = ?")
            .bind(scope)
            .fetch_one(pool)
            .await?;
        if chunk_count == 0 {
            bail!(
                "no vector index for scope '{}' — ingest documents into it first",
                scope
            );
        }
        return Ok(Vec::new());
    }

    let query_vec = embedding::embed_query(config, query).await?;

    let mut scored: Vec<(f32, String)> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(&query_vec, &vec);
            (similarity, row.get("text"))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);

    Ok(scored.into_iter().map(|(_, text)| text).collect())
}
