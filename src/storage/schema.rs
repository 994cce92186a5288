//! Database schema constants for the page store.
//!
//! The crawler pipeline owns the `pages` table; these statements exist so a
//! fresh database (local development, integration tests) can be brought up
//! with the columns the dispatcher reads.

/// SQL schema for creating the pages table.
pub const CREATE_PAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    url TEXT PRIMARY KEY,
    domain VARCHAR(255) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    s3_key VARCHAR(1024) NOT NULL DEFAULT 'NOT_CRAWLED',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// Index backing the stale-active selection.
pub const CREATE_PAGES_ACTIVE_UPDATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pages_active_updated_at ON pages(is_active, updated_at)
"#;

/// Index for per-domain lookups by the crawler.
pub const CREATE_PAGES_DOMAIN_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pages_domain ON pages(domain)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_PAGES_TABLE,
        CREATE_PAGES_ACTIVE_UPDATED_INDEX,
        CREATE_PAGES_DOMAIN_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    /// Pages table name.
    pub const PAGES: &str = "pages";
}
