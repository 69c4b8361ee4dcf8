//! Rows and value types exchanged with the persistent store.

use chrono::NaiveDate;
use sqlx::FromRow;

// =============================================================================
// Projects
// =============================================================================

/// Active project as stored, looked up by its external UUID.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub user_id: i64,
    pub uuid: String,
    pub fqdn: String,
    pub protocol: String,
    pub base_path: Option<String>,
}

/// A tenant's image origin together with the key its paths are signed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub user_id: i64,
    pub uuid: String,
    pub protocol: String,
    pub host: String,
    pub base_path: Option<String>,
    pub signing_secret: String,
}

impl Project {
    pub fn from_row(row: ProjectRow, signing_secret: impl Into<String>) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            uuid: row.uuid,
            protocol: row.protocol,
            host: row.fqdn,
            base_path: row.base_path,
            signing_secret: signing_secret.into(),
        }
    }

    /// `{protocol}://{host}[/{base_path}]`
    pub fn origin_url(&self) -> String {
        match self
            .base_path
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
        {
            Some(base) => format!("{}://{}/{}", self.protocol, self.host, base),
            None => format!("{}://{}", self.protocol, self.host),
        }
    }
}

// =============================================================================
// Resolved transformations
// =============================================================================

/// Natural key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub project_id: i64,
    pub origin_path: String,
    pub transformation: String,
    pub smart: bool,
}

/// One resolved transformation and where its result lives on the CDN.
#[derive(Debug, Clone, FromRow)]
pub struct CacheEntry {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    /// Backend signature the entry was generated with
    pub image_key: String,
    pub origin: String,
    pub origin_path: String,
    pub transformation: String,
    pub is_smart: bool,
    pub cdn_path: String,
    /// `None` (or a legacy 0) until the size has been measured
    pub file_size: Option<i64>,
}

impl CacheEntry {
    pub fn known_size(&self) -> Option<i64> {
        self.file_size.filter(|size| *size > 0)
    }
}

/// Insert intent for a freshly resolved transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCacheEntry {
    pub user_id: i64,
    pub project_id: i64,
    pub image_key: String,
    pub origin: String,
    pub origin_path: String,
    pub transformation: String,
    pub is_smart: bool,
    pub cdn_path: String,
}

impl NewCacheEntry {
    pub fn key(&self) -> CacheKey {
        CacheKey {
            project_id: self.project_id,
            origin_path: self.origin_path.clone(),
            transformation: self.transformation.clone(),
            smart: self.is_smart,
        }
    }
}

// =============================================================================
// Daily analytics
// =============================================================================

/// Usage counters for one project on one day.
#[derive(Debug, Clone, FromRow)]
pub struct DailyAnalytic {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub day: NaiveDate,
    pub uniq_request: i64,
    pub total_request: i64,
    pub total_bytes: i64,
    pub last_image_id: Option<i64>,
}

/// Additive change applied to a day's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalyticDelta {
    pub unique: i64,
    pub total: i64,
    pub bytes: i64,
}
