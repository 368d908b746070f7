//! Scoped knowledge-graph store.
//!
//! Entities are shared across scopes and keyed by normalized name;
//! relationships carry the scope tag. Upserts are idempotent, and scope
//! deletion removes relationships first, then any entity left with no
//! remaining relationships — entities still referenced by another scope
//! survive.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::Triple;

#[derive(Clone)]
pub struct GraphStore {
    pool: SqlitePool,
}

impl GraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent merge of one triple: create missing entities (recording
    /// the creating scope and time as metadata only) and the scoped
    /// relationship. Re-inserting an identical triple is a no-op.
    pub async fn upsert_triple(&self, triple: &Triple) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for name in [&triple.subject, &triple.object] {
            sqlx::query(
                r#"
                INSERT INTO entities (name, created_scope, created_at) VALUES (?, ?, ?)
                ON CONFLICT(name) DO NOTHING
                "#,
            )
            .bind(name)
            .bind(&triple.scope)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO relations (subject, predicate, object, scope) VALUES (?, ?, ?, ?)
            ON CONFLICT(subject, predicate, object, scope) DO NOTHING
            "#,
        )
        .bind(&triple.subject)
        .bind(&triple.predicate)
        .bind(&triple.object)
        .bind(&triple.scope)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove the scope's relationships, then any entity left with zero
    /// remaining relationships. Relationships go first; entities still
    /// referenced by another scope's edges survive the orphan pass.
    pub async fn delete_scope(&self, scope: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM relations WHERE scope = ?")
            .bind(scope)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM entities
            WHERE name NOT IN (SELECT subject FROM relations)
              AND name NOT IN (SELECT object FROM relations)
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Relationships within `scope` where either endpoint contains any of
    /// the keywords as a substring, unioned across keywords and capped at
    /// `limit`. Entity names are stored lower-cased, so matching is
    /// case-insensitive against lower-cased keywords. Keywords match
    /// literally; LIKE metacharacters in them are escaped.
    pub async fn find_by_keywords(
        &self,
        scope: &str,
        keywords: &[String],
        limit: i64,
    ) -> Result<Vec<Triple>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT subject, predicate, object, scope FROM relations WHERE scope = ? AND (",
        );
        for i in 0..keywords.len() {
            if i > 0 {
                sql.push_str(" OR ");
            }
            sql.push_str("subject LIKE ? ESCAPE '\\' OR object LIKE ? ESCAPE '\\'");
        }
        sql.push_str(") LIMIT ?");

        let mut query = sqlx::query(&sql).bind(scope);
        for keyword in keywords {
            let pattern = format!("%{}%", escape_like(&keyword.to_lowercase()));
            query = query.bind(pattern.clone()).bind(pattern);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| Triple {
                subject: row.get("subject"),
                predicate: row.get("predicate"),
                object: row.get("object"),
                scope: row.get("scope"),
            })
            .collect())
    }

    /// Number of relationships tagged with `scope`.
    pub async fn relation_count(&self, scope: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM relations WHERE scope = ?")
            .bind(scope)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether an entity node exists, regardless of scope.
    pub async fn entity_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// Escape LIKE metacharacters so keywords match literally. The query
/// declares `ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
