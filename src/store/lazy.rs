//! Store opened on first use.
//!
//! Pingora forks before its services start when running as a daemon, and
//! a pool opened before the fork loses its runtime and worker threads.
//! `LazyStore` defers `from_config` to the first call, which runs on the
//! proxy's own runtime.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::error::{StoreError, StoreResult};
use super::models::{AnalyticDelta, CacheEntry, CacheKey, DailyAnalytic, NewCacheEntry, ProjectRow};
use super::{from_config, ImageStore};
use crate::config::DatabaseConfig;

pub struct LazyStore {
    config: DatabaseConfig,
    inner: OnceCell<Arc<dyn ImageStore>>,
}

impl LazyStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            inner: OnceCell::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.initialized()
    }

    /// Open the store, retrying on every call until one succeeds.
    async fn store(&self) -> StoreResult<&Arc<dyn ImageStore>> {
        self.inner
            .get_or_try_init(|| async {
                let store = from_config(&self.config).await?;
                tracing::info!("Persistent store opened");
                Ok::<_, StoreError>(store)
            })
            .await
    }
}

#[async_trait]
impl ImageStore for LazyStore {
    async fn find_active_project(&self, uuid: &str) -> StoreResult<Option<ProjectRow>> {
        self.store().await?.find_active_project(uuid).await
    }

    async fn find_cache_entry(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        self.store().await?.find_cache_entry(key).await
    }

    async fn insert_cache_entry(&self, entry: &NewCacheEntry) -> StoreResult<i64> {
        self.store().await?.insert_cache_entry(entry).await
    }

    async fn update_cache_entry_size(&self, id: i64, bytes: i64) -> StoreResult<bool> {
        self.store().await?.update_cache_entry_size(id, bytes).await
    }

    async fn find_today_analytic(
        &self,
        project_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Option<DailyAnalytic>> {
        self.store()
            .await?
            .find_today_analytic(project_id, today)
            .await
    }

    async fn upsert_analytic(
        &self,
        project_id: i64,
        user_id: i64,
        day: NaiveDate,
        delta: AnalyticDelta,
        last_entry_id: Option<i64>,
    ) -> StoreResult<()> {
        self.store()
            .await?
            .upsert_analytic(project_id, user_id, day, delta, last_entry_id)
            .await
    }

    /// Opening the store already migrates it.
    async fn migrate(&self) -> StoreResult<()> {
        self.store().await.map(|_| ())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.store().await?.health_check().await
    }
}
