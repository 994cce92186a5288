//! Schema bootstrap for the page store.
//!
//! Each statement from [`schema`] is applied at most once and recorded by
//! name in `_migrations`, so re-running `migrate` is a no-op.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

use super::schema;

const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    name VARCHAR(255) PRIMARY KEY,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Errors raised while bootstrapping the schema.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Bookkeeping query or transaction failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A schema statement was rejected.
    #[error("Migration {name} failed: {source}")]
    Statement {
        name: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies pending schema statements to a pool.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies every pending statement and returns how many ran.
    pub async fn run_migrations(&self) -> Result<usize, MigrationError> {
        sqlx::query(CREATE_MIGRATIONS_TABLE)
            .execute(&self.pool)
            .await?;

        let applied: Vec<String> = sqlx::query_scalar("SELECT name FROM _migrations")
            .fetch_all(&self.pool)
            .await?;
        let pending = pending_migrations(&applied);
        debug!(
            applied = applied.len(),
            pending = pending.len(),
            "Checked migration history"
        );

        for (name, sql) in &pending {
            let mut tx = self.pool.begin().await?;
            sqlx::query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| MigrationError::Statement {
                    name: name.clone(),
                    source,
                })?;
            sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(migration = %name, "Applied migration");
        }

        Ok(pending.len())
    }
}

fn migration_name(idx: usize) -> String {
    format!("pages_v1_part_{}", idx)
}

/// Schema statements not yet recorded in `applied`, in schema order.
fn pending_migrations(applied: &[String]) -> Vec<(String, &'static str)> {
    schema::all_schema_statements()
        .into_iter()
        .enumerate()
        .map(|(idx, sql)| (migration_name(idx), sql))
        .filter(|(name, _)| !applied.contains(name))
        .collect()
}
