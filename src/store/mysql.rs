//! MySQL-backed store for shared deployments.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{MySql, Pool};
use std::str::FromStr;

use super::error::StoreResult;
use super::models::{AnalyticDelta, CacheEntry, CacheKey, DailyAnalytic, NewCacheEntry, ProjectRow};
use super::{schema_statements, ImageStore};

const MYSQL_SCHEMA: &str = include_str!("mysql_schema.sql");

/// MySQL-based store.
pub struct MySqlStore {
    pool: Pool<MySql>,
}

impl MySqlStore {
    /// Create a new MySQL store from a connection URL and migrate it.
    pub async fn from_url(url: &str, max_connections: u32) -> StoreResult<Self> {
        let opts = MySqlConnectOptions::from_str(url)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl ImageStore for MySqlStore {
    async fn find_active_project(&self, uuid: &str) -> StoreResult<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, user_id, uuid, fqdn, protocol, base_path FROM projects \
             WHERE uuid = ? AND is_active = 1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_cache_entry(&self, key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        let row = sqlx::query_as::<_, CacheEntry>(
            r#"
            SELECT id, user_id, project_id, image_key, origin, origin_path,
                   transformation, is_smart, cdn_path, file_size
            FROM images
            WHERE project_id = ? AND origin_path = ? AND transformation = ? AND is_smart = ?
            "#,
        )
        .bind(key.project_id)
        .bind(&key.origin_path)
        .bind(&key.transformation)
        .bind(key.smart)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_cache_entry(&self, entry: &NewCacheEntry) -> StoreResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO images (
                user_id, project_id, image_key, origin, origin_path, transformation,
                is_smart, cdn_path, file_size, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.project_id)
        .bind(&entry.image_key)
        .bind(&entry.origin)
        .bind(&entry.origin_path)
        .bind(&entry.transformation)
        .bind(entry.is_smart)
        .bind(&entry.cdn_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_id() as i64)
    }

    async fn update_cache_entry_size(&self, id: i64, bytes: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE images SET file_size = ?, updated_at = ? \
             WHERE id = ? AND (file_size IS NULL OR file_size = 0)",
        )
        .bind(bytes)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_today_analytic(
        &self,
        project_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Option<DailyAnalytic>> {
        let row = sqlx::query_as::<_, DailyAnalytic>(
            "SELECT id, user_id, project_id, day, uniq_request, total_request, total_bytes, \
             last_image_id FROM analytics WHERE project_id = ? AND day = ?",
        )
        .bind(project_id)
        .bind(today)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_analytic(
        &self,
        project_id: i64,
        user_id: i64,
        day: NaiveDate,
        delta: AnalyticDelta,
        last_entry_id: Option<i64>,
    ) -> StoreResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO analytics (
                user_id, project_id, day, uniq_request, total_request, total_bytes,
                last_image_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                uniq_request = uniq_request + VALUES(uniq_request),
                total_request = total_request + VALUES(total_request),
                total_bytes = total_bytes + VALUES(total_bytes),
                last_image_id = COALESCE(VALUES(last_image_id), last_image_id),
                updated_at = VALUES(updated_at)
            "#,
        )
        .bind(user_id)
        .bind(project_id)
        .bind(day)
        .bind(delta.unique)
        .bind(delta.total)
        .bind(delta.bytes)
        .bind(last_entry_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in schema_statements(MYSQL_SCHEMA) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
