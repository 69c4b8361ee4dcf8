// Error types module

use thiserror::Error;

use crate::analytics::ProbeError;
use crate::store::StoreError;

/// Errors raised while resolving a transformation request.
///
/// Only `MalformedTransformation` aborts the in-flight request. The other
/// variants describe best-effort work that degrades instead of failing:
/// a lookup failure falls through to generation, persistence and probe
/// failures are logged from detached tasks and never reach the client.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Transformation string lacks a usable size directive
    #[error("Malformed transformation '{transformation}': {reason}")]
    MalformedTransformation {
        transformation: String,
        reason: String,
    },

    /// Store unreachable or the row could not be read
    #[error("Cache lookup failed: {0}")]
    CacheLookupFailure(#[source] StoreError),

    /// Detached insert or update failed
    #[error("Persistence failed: {0}")]
    PersistenceFailure(#[source] StoreError),

    /// Byte-size backfill failed
    #[error("Size probe failed: {0}")]
    ProbeFailure(#[source] ProbeError),
}

impl ResolveError {
    pub fn malformed(transformation: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::MalformedTransformation {
            transformation: transformation.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error must abort the request instead of degrading
    pub fn is_fatal(&self) -> bool {
        matches!(self, ResolveError::MalformedTransformation { .. })
    }

    /// Maps resolution errors to HTTP status codes
    ///
    /// - MalformedTransformation → 400 (Bad Request)
    /// - everything else → 500; in practice these never reach a client
    pub fn to_http_status(&self) -> u16 {
        match self {
            ResolveError::MalformedTransformation { .. } => 400,
            ResolveError::CacheLookupFailure(_)
            | ResolveError::PersistenceFailure(_)
            | ResolveError::ProbeFailure(_) => 500,
        }
    }
}
