//! PostgreSQL page store.
//!
//! The dispatcher only reads from the store: it asks for a bounded batch of
//! active pages whose last update is older than the staleness window.
//!
//! # Overview
//!
//! - **WorkItemStore**: the read interface the dispatch pass depends on
//! - **PgWorkItemStore**: sqlx-backed implementation over the `pages` table
//! - **Migrations**: schema bootstrap for fresh databases
//!
//! # Usage
//!
//! ```rust,ignore
//! use crawl_dispatch::storage::{PgWorkItemStore, SelectionOrder, SelectionQuery, WorkItemStore};
//! use std::time::Duration;
//!
//! let store = PgWorkItemStore::connect(&config.store).await?;
//! let query = SelectionQuery {
//!     limit: 10,
//!     staleness_window: Duration::from_secs(24 * 3600),
//!     order: SelectionOrder::Random,
//! };
//! let items = store.select_stale_active(&query).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod schema;
pub mod work_item;

// Re-export main types for convenience
pub use database::{PgWorkItemStore, StoreError};
pub use migrations::{MigrationError, MigrationRunner};
pub use work_item::{SelectionOrder, SelectionQuery, WorkItem, WorkItemStore};
