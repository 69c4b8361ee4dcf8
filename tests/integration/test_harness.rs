// Test utilities shared by the integration tests
//
// Every test gets its own SQLite database in a temp dir, a resolver wired
// to it, and (where needed) a raw TCP server standing in for the CDN.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use thumbgate::analytics::{AnalyticsAggregator, ProbeError, SizeProbe};
use thumbgate::config::{CdnConfig, HitMode};
use thumbgate::resolver::{CacheResolver, ResolveRequest};
use thumbgate::store::{
    AnalyticDelta, CacheEntry, CacheKey, DailyAnalytic, ImageStore, NewCacheEntry, Project,
    ProjectRow, SqliteStore, StoreError, StoreResult,
};

pub const PROJECT_ID: i64 = 7;
pub const USER_ID: i64 = 3;

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub resolver: CacheResolver,
    _dir: TempDir,
}

pub fn cdn(origin: &str) -> CdnConfig {
    CdnConfig {
        origin: origin.to_string(),
        result_storage: "results".to_string(),
        hit_mode: HitMode::Redirect,
    }
}

pub async fn temp_store() -> (Arc<SqliteStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("thumbgate.db"))
        .await
        .unwrap();
    (Arc::new(store), dir)
}

pub async fn harness(probe: Arc<dyn SizeProbe>, cdn_config: CdnConfig) -> Harness {
    let (store, dir) = temp_store().await;
    let analytics = AnalyticsAggregator::new(store.clone(), probe);
    let resolver = CacheResolver::new(store.clone(), analytics, cdn_config);
    Harness {
        store,
        resolver,
        _dir: dir,
    }
}

pub fn project(protocol: &str) -> Project {
    Project {
        id: PROJECT_ID,
        user_id: USER_ID,
        uuid: "4d7c3c9e-project".to_string(),
        protocol: protocol.to_string(),
        host: "img.example.com".to_string(),
        base_path: None,
        signing_secret: "MY_SECURE_KEY".to_string(),
    }
}

pub fn request(transformation: &str, image: &str) -> ResolveRequest {
    ResolveRequest {
        project: project("https"),
        origin_path: image.to_string(),
        transformation: transformation.to_string(),
        smart: false,
    }
}

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

pub async fn image_rows(store: &SqliteStore) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM images")
        .fetch_one(store.pool())
        .await
        .unwrap()
}

/// Probe answering a fixed size and counting calls
pub struct FixedProbe {
    size: Option<u64>,
    calls: AtomicUsize,
}

impl FixedProbe {
    pub fn ok(size: u64) -> Arc<Self> {
        Arc::new(Self {
            size: Some(size),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            size: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SizeProbe for FixedProbe {
    async fn content_length(&self, _url: &str) -> Result<u64, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.size.ok_or(ProbeError::UnexpectedStatus(503))
    }
}

/// Store that fails the test if it is touched at all
pub struct UntouchableStore;

#[async_trait]
impl ImageStore for UntouchableStore {
    async fn find_active_project(&self, _uuid: &str) -> StoreResult<Option<ProjectRow>> {
        panic!("store accessed: find_active_project");
    }

    async fn find_cache_entry(&self, _key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        panic!("store accessed: find_cache_entry");
    }

    async fn insert_cache_entry(&self, _entry: &NewCacheEntry) -> StoreResult<i64> {
        panic!("store accessed: insert_cache_entry");
    }

    async fn update_cache_entry_size(&self, _id: i64, _bytes: i64) -> StoreResult<bool> {
        panic!("store accessed: update_cache_entry_size");
    }

    async fn find_today_analytic(
        &self,
        _project_id: i64,
        _today: NaiveDate,
    ) -> StoreResult<Option<DailyAnalytic>> {
        panic!("store accessed: find_today_analytic");
    }

    async fn upsert_analytic(
        &self,
        _project_id: i64,
        _user_id: i64,
        _day: NaiveDate,
        _delta: AnalyticDelta,
        _last_entry_id: Option<i64>,
    ) -> StoreResult<()> {
        panic!("store accessed: upsert_analytic");
    }

    async fn migrate(&self) -> StoreResult<()> {
        panic!("store accessed: migrate");
    }

    async fn health_check(&self) -> StoreResult<()> {
        panic!("store accessed: health_check");
    }
}

/// SQLite store whose cache lookups always fail
pub struct LookupFailingStore {
    pub inner: Arc<SqliteStore>,
}

#[async_trait]
impl ImageStore for LookupFailingStore {
    async fn find_active_project(&self, uuid: &str) -> StoreResult<Option<ProjectRow>> {
        self.inner.find_active_project(uuid).await
    }

    async fn find_cache_entry(&self, _key: &CacheKey) -> StoreResult<Option<CacheEntry>> {
        Err(StoreError::Config("connection refused".to_string()))
    }

    async fn insert_cache_entry(&self, entry: &NewCacheEntry) -> StoreResult<i64> {
        self.inner.insert_cache_entry(entry).await
    }

    async fn update_cache_entry_size(&self, id: i64, bytes: i64) -> StoreResult<bool> {
        self.inner.update_cache_entry_size(id, bytes).await
    }

    async fn find_today_analytic(
        &self,
        project_id: i64,
        today: NaiveDate,
    ) -> StoreResult<Option<DailyAnalytic>> {
        self.inner.find_today_analytic(project_id, today).await
    }

    async fn upsert_analytic(
        &self,
        project_id: i64,
        user_id: i64,
        day: NaiveDate,
        delta: AnalyticDelta,
        last_entry_id: Option<i64>,
    ) -> StoreResult<()> {
        self.inner
            .upsert_analytic(project_id, user_id, day, delta, last_entry_id)
            .await
    }

    async fn migrate(&self) -> StoreResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }
}

/// Start a CDN stand-in answering every request with 200 and the given
/// Content-Length. Returns its `host:port` and a request counter.
pub async fn start_cdn_mock(content_length: u64) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    content_length
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr.to_string(), hits)
}
