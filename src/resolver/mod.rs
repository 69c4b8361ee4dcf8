//! Cache resolver
//!
//! Decides per request whether a transformation has already been rendered
//! (hit: answer from the CDN) or must be generated by the image backend
//! (miss: proxy a freshly signed path). Persistence of new entries and all
//! analytics run on a detached task so the response never waits on them.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::analytics::{AnalyticEvent, AnalyticsAggregator};
use crate::config::CdnConfig;
use crate::error::ResolveError;
use crate::signing::{build_signed_path, cdn_public_path, SignRequest};
use crate::store::{CacheKey, ImageStore, NewCacheEntry, Project, StoreError};
use crate::transform::parse_transformation;

/// One inbound transformation request
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub project: Project,
    /// Image path relative to the project origin
    pub origin_path: String,
    /// Transformation string as received, also the cache key component
    pub transformation: String,
    pub smart: bool,
}

impl ResolveRequest {
    fn cache_key(&self) -> CacheKey {
        CacheKey {
            project_id: self.project.id,
            origin_path: self.origin_path.clone(),
            transformation: self.transformation.clone(),
            smart: self.smart,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    Hit,
    Miss,
}

/// What the router should do with the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// Already rendered; serve `cdn_relative_path` from the CDN
    Hit {
        cdn_relative_path: String,
        size: Option<i64>,
    },
    /// Proxy `backend_path` to the image backend
    Miss {
        cdn_relative_path: String,
        backend_path: String,
    },
}

impl ResolveResult {
    pub fn kind(&self) -> ResolveKind {
        match self {
            ResolveResult::Hit { .. } => ResolveKind::Hit,
            ResolveResult::Miss { .. } => ResolveKind::Miss,
        }
    }

    pub fn cdn_relative_path(&self) -> &str {
        match self {
            ResolveResult::Hit {
                cdn_relative_path, ..
            }
            | ResolveResult::Miss {
                cdn_relative_path, ..
            } => cdn_relative_path,
        }
    }

    pub fn backend_path(&self) -> Option<&str> {
        match self {
            ResolveResult::Hit { .. } => None,
            ResolveResult::Miss { backend_path, .. } => Some(backend_path),
        }
    }
}

/// A resolution and its detached bookkeeping.
///
/// Dropping `bookkeeping` detaches the task; it still runs to completion.
#[derive(Debug)]
pub struct Resolution {
    pub result: ResolveResult,
    pub bookkeeping: JoinHandle<()>,
}

#[derive(Clone)]
pub struct CacheResolver {
    store: Arc<dyn ImageStore>,
    analytics: AnalyticsAggregator,
    cdn: CdnConfig,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn ImageStore>, analytics: AnalyticsAggregator, cdn: CdnConfig) -> Self {
        Self {
            store,
            analytics,
            cdn,
        }
    }

    /// Resolve a request to a hit or a miss.
    ///
    /// Fails only with `MalformedTransformation`, before touching the store.
    /// Must be called within a tokio runtime.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<Resolution, ResolveError> {
        let directives = parse_transformation(&request.transformation)?;
        let key = request.cache_key();

        let found = match self.store.find_cache_entry(&key).await {
            Ok(found) => found,
            Err(e) => {
                let err = ResolveError::CacheLookupFailure(e);
                tracing::warn!(
                    project_id = request.project.id,
                    origin_path = %request.origin_path,
                    transformation = %request.transformation,
                    error = %err,
                    "Cache lookup failed, generating fresh"
                );
                None
            }
        };

        if let Some(entry) = found {
            let size = entry.known_size();
            let public_path = cdn_public_path(&entry.cdn_path, &self.cdn.result_storage);
            let event = AnalyticEvent::Hit {
                entry_id: entry.id,
                size,
                probe_url: self.cdn.public_url(&request.project.protocol, &public_path),
            };

            tracing::debug!(
                project_id = request.project.id,
                entry_id = entry.id,
                cdn_path = %entry.cdn_path,
                "Cache hit"
            );

            let analytics = self.analytics.clone();
            let project = request.project;
            let bookkeeping = tokio::spawn(async move {
                analytics.record(&project, event).await;
            });

            return Ok(Resolution {
                result: ResolveResult::Hit {
                    cdn_relative_path: entry.cdn_path,
                    size,
                },
                bookkeeping,
            });
        }

        let origin_url = request.project.origin_url();
        let signed = build_signed_path(
            &directives,
            &SignRequest {
                origin_url: &origin_url,
                origin_path: &request.origin_path,
                secret: &request.project.signing_secret,
                smart: request.smart,
                result_storage: &self.cdn.result_storage,
            },
        )?;

        tracing::debug!(
            project_id = request.project.id,
            backend_path = %signed.backend_path,
            "Cache miss"
        );

        let entry = NewCacheEntry {
            user_id: request.project.user_id,
            project_id: request.project.id,
            image_key: signed.signature.clone(),
            origin: origin_url,
            origin_path: request.origin_path,
            transformation: request.transformation,
            is_smart: request.smart,
            cdn_path: signed.cdn_relative_path.clone(),
        };

        let store = self.store.clone();
        let analytics = self.analytics.clone();
        let project = request.project;
        let bookkeeping = tokio::spawn(async move {
            let entry_id = persist_entry(store.as_ref(), &entry).await;
            analytics
                .record(&project, AnalyticEvent::Miss { entry_id })
                .await;
        });

        Ok(Resolution {
            result: ResolveResult::Miss {
                cdn_relative_path: signed.cdn_relative_path,
                backend_path: signed.backend_path,
            },
            bookkeeping,
        })
    }
}

/// Insert a freshly resolved entry, treating an existing row as success.
///
/// Returns the id of the row now holding the key, if it could be determined.
async fn persist_entry(store: &dyn ImageStore, entry: &NewCacheEntry) -> Option<i64> {
    match store.insert_cache_entry(entry).await {
        Ok(id) => Some(id),
        Err(StoreError::DuplicateKey) => {
            tracing::debug!(
                project_id = entry.project_id,
                origin_path = %entry.origin_path,
                "Cache entry already present"
            );
            match store.find_cache_entry(&entry.key()).await {
                Ok(existing) => existing.map(|e| e.id),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to re-read existing cache entry");
                    None
                }
            }
        }
        Err(e) => {
            let err = ResolveError::PersistenceFailure(e);
            tracing::warn!(
                project_id = entry.project_id,
                origin_path = %entry.origin_path,
                error = %err,
                "Dropping cache entry"
            );
            None
        }
    }
}
