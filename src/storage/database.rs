//! PostgreSQL page store.
//!
//! This module provides the production [`WorkItemStore`] backed by a sqlx
//! connection pool over the crawler's `pages` table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{SslMode, StoreConfig};

use super::migrations::MigrationRunner;
use super::work_item::{SelectionQuery, WorkItem, WorkItemStore};

/// How long the startup ping may take before the store is considered down.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// A row did not describe a valid work item.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),
}

/// Page store over a PostgreSQL pool.
pub struct PgWorkItemStore {
    pool: PgPool,
}

impl PgWorkItemStore {
    /// Connects to the database and verifies it answers within five seconds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the pool cannot be created or
    /// the ping fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database)
            .ssl_mode(pg_ssl_mode(config.ssl_mode));
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        match tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(&pool)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                pool.close().await;
                return Err(StoreError::ConnectionFailed(format!("ping failed: {}", e)));
            }
            Err(_) => {
                pool.close().await;
                return Err(StoreError::ConnectionFailed(format!(
                    "ping timed out after {:?}",
                    PING_TIMEOUT
                )));
            }
        }

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            ssl_mode = %config.ssl_mode,
            "Connected to page store"
        );

        Ok(Self { pool })
    }

    /// Runs database migrations, returning how many were applied.
    pub async fn run_migrations(&self) -> Result<usize, StoreError> {
        let runner = MigrationRunner::new(self.pool.clone());
        Ok(runner.run_migrations().await?)
    }

    /// Inserts or updates a page row.
    ///
    /// The dispatcher itself never writes pages; this exists for seeding local
    /// and integration-test databases.
    pub async fn upsert_page(
        &self,
        url: &str,
        domain: &str,
        is_active: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pages (url, domain, is_active, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (url) DO UPDATE SET
                domain = EXCLUDED.domain,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(url)
        .bind(domain)
        .bind(is_active)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl WorkItemStore for PgWorkItemStore {
    async fn select_stale_active(
        &self,
        query: &SelectionQuery,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let rows = sqlx::query(&query.sql())
            .bind(true)
            .bind(query.window_secs())
            .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let url: String = row.try_get("url")?;
            let domain: String = row.try_get("domain")?;
            items.push(WorkItem::new(url, domain)?);
        }

        debug!(
            selected = items.len(),
            limit = query.limit,
            order = %query.order,
            "Selected stale pages"
        );

        Ok(items)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}
