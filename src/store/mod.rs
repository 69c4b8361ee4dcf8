//! Persistent store for projects, resolved transformations and daily analytics
//!
//! The resolver and the analytics aggregator only see the narrow
//! [`ImageStore`] contract. Two sqlx-backed implementations exist:
//! SQLite (single node, tests) and MySQL (shared deployments).
//!
//! Both guarantee:
//! - at most one cache entry per `(project, origin path, transformation, smart)`;
//!   a second insert fails with [`StoreError::DuplicateKey`]
//! - one analytics row per `(project, day)`, updated with a single
//!   insert-or-increment statement so concurrent requests never lose counts

pub mod error;
pub mod lazy;
pub mod models;
pub mod mysql;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use models::{
    AnalyticDelta, CacheEntry, CacheKey, DailyAnalytic, NewCacheEntry, Project, ProjectRow,
};
pub use lazy::LazyStore;
pub use mysql::MySqlStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

use crate::config::DatabaseConfig;

/// Read/write contract consumed by the resolver and analytics.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Look up an active project by its external UUID.
    async fn find_active_project(&self, uuid: &str) -> StoreResult<Option<ProjectRow>>;

    /// Look up a resolved transformation by its natural key.
    async fn find_cache_entry(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>>;

    /// Insert a resolved transformation and return its id.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if the natural key exists.
    async fn insert_cache_entry(&self, entry: &NewCacheEntry) -> StoreResult<i64>;

    /// Record a measured byte size on an entry whose size is still unknown.
    ///
    /// Returns `false` when the size had already been recorded, so a
    /// measurement is only ever counted once.
    async fn update_cache_entry_size(&self, id: i64, bytes: i64) -> StoreResult<bool>;

    /// Analytics row of a project for the given day.
    async fn find_today_analytic(
        &self,
        project_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Option<DailyAnalytic>>;

    /// Create the day's row seeded with `delta`, or add `delta` to it.
    ///
    /// `last_entry_id` replaces the stored reference when present.
    async fn upsert_analytic(
        &self,
        project_id: i64,
        user_id: i64,
        day: NaiveDate,
        delta: AnalyticDelta,
        last_entry_id: Option<i64>,
    ) -> StoreResult<()>;

    /// Create tables and indexes if missing.
    async fn migrate(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;
}

/// Split an embedded schema into executable statements.
///
/// `--` comment lines are dropped before splitting on `;`, so comments may
/// contain semicolons.
pub(crate) fn schema_statements(schema: &str) -> Vec<String> {
    let sql = schema
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    sql.split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

/// Create a store from configuration and run its migrations.
pub async fn from_config(config: &DatabaseConfig) -> StoreResult<Arc<dyn ImageStore>> {
    match config {
        DatabaseConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store) as Arc<dyn ImageStore>)
        }
        DatabaseConfig::Mysql {
            url,
            max_connections,
        } => {
            if url.is_empty() {
                return Err(StoreError::Config(
                    "mysql config requires a non-empty 'url'".to_string(),
                ));
            }
            tracing::info!(max_connections = max_connections, "Connecting to MySQL");
            let store = MySqlStore::from_url(url, *max_connections).await?;
            Ok(Arc::new(store) as Arc<dyn ImageStore>)
        }
    }
}
