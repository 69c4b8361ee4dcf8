//! Daily per-project request analytics
//!
//! Every resolution produces one [`AnalyticEvent`]. The aggregator turns it
//! into an [`AnalyticDelta`] and applies it through the store's atomic
//! upsert, so concurrent requests for the same project and day never lose
//! increments. The first event of a day seeds a blank row with its own
//! delta; a hit therefore never counts as a unique request.
//!
//! Bytes are counted once per cache entry, on the day its size is first
//! measured.
//!
//! | event | unique | total | bytes |
//! |-------|--------|-------|-------|
//! | miss  | +1     | +1    | +0    |
//! | hit, size known   | +0 | +1 | +0 |
//! | hit, size unknown | +0 | +1 | +measured size, if this hit stored it |

pub mod probe;

pub use probe::{HttpSizeProbe, ProbeError, SizeProbe};

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::error::ResolveError;
use crate::store::{AnalyticDelta, ImageStore, Project};

/// Outcome of a resolution as seen by analytics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticEvent {
    Hit {
        entry_id: i64,
        /// Stored byte size, `None` while still unknown
        size: Option<i64>,
        /// Public URL the size can be measured at
        probe_url: String,
    },
    Miss {
        /// Id of the entry this miss created or converged on, if persisted
        entry_id: Option<i64>,
    },
}

/// Applies analytic events to the store.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: Arc<dyn ImageStore>,
    probe: Arc<dyn SizeProbe>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn ImageStore>, probe: Arc<dyn SizeProbe>) -> Self {
        Self { store, probe }
    }

    /// Record an event against today's (UTC) row.
    pub async fn record(&self, project: &Project, event: AnalyticEvent) -> AnalyticDelta {
        self.record_on(project, event, Utc::now().date_naive()).await
    }

    /// Record an event against the row of `day`.
    ///
    /// Never fails: store and probe errors are logged and the returned
    /// delta reflects what was actually applied.
    pub async fn record_on(
        &self,
        project: &Project,
        event: AnalyticEvent,
        day: NaiveDate,
    ) -> AnalyticDelta {
        let (delta, last_entry_id) = match event {
            AnalyticEvent::Miss { entry_id } => (
                AnalyticDelta {
                    unique: 1,
                    total: 1,
                    bytes: 0,
                },
                entry_id,
            ),
            AnalyticEvent::Hit {
                entry_id,
                size: Some(_),
                ..
            } => (
                AnalyticDelta {
                    unique: 0,
                    total: 1,
                    bytes: 0,
                },
                Some(entry_id),
            ),
            AnalyticEvent::Hit {
                entry_id,
                size: None,
                probe_url,
            } => {
                let bytes = self.backfill_size(project, entry_id, &probe_url).await;
                (
                    AnalyticDelta {
                        unique: 0,
                        total: 1,
                        bytes,
                    },
                    Some(entry_id),
                )
            }
        };

        match self
            .store
            .upsert_analytic(project.id, project.user_id, day, delta, last_entry_id)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    project_id = project.id,
                    day = %day,
                    unique = delta.unique,
                    total = delta.total,
                    bytes = delta.bytes,
                    "Analytics updated"
                );
                delta
            }
            Err(e) => {
                let err = ResolveError::PersistenceFailure(e);
                tracing::warn!(
                    project_id = project.id,
                    day = %day,
                    error = %err,
                    "Dropping analytics update"
                );
                AnalyticDelta::default()
            }
        }
    }

    /// Measure an entry's size and record it. Returns the bytes to add to
    /// today's counter: the measurement if this call stored it, else 0.
    async fn backfill_size(&self, project: &Project, entry_id: i64, probe_url: &str) -> i64 {
        let measured = match self.probe.content_length(probe_url).await {
            Ok(measured) => measured,
            Err(e) => {
                let err = ResolveError::ProbeFailure(e);
                tracing::warn!(
                    project_id = project.id,
                    entry_id = entry_id,
                    url = %probe_url,
                    error = %err,
                    "Size backfill skipped"
                );
                return 0;
            }
        };

        let bytes = i64::try_from(measured).unwrap_or(i64::MAX);
        if bytes == 0 {
            return 0;
        }

        match self.store.update_cache_entry_size(entry_id, bytes).await {
            Ok(true) => {
                tracing::info!(
                    project_id = project.id,
                    entry_id = entry_id,
                    bytes = bytes,
                    "Backfilled image size"
                );
                bytes
            }
            // Another request recorded it first and already counted it.
            Ok(false) => 0,
            Err(e) => {
                let err = ResolveError::PersistenceFailure(e);
                tracing::warn!(
                    project_id = project.id,
                    entry_id = entry_id,
                    error = %err,
                    "Failed to store measured size"
                );
                0
            }
        }
    }
}
