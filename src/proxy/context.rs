//! Per-request state carried between Pingora phases.

use std::time::Instant;
use uuid::Uuid;

use crate::resolver::ResolveKind;

/// Where a resolved request is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamTarget {
    /// Internal image backend, plain HTTP, signed path as URI
    Backend { path: String },
    /// Public CDN, proxying a hit
    Cdn { path: String, tls: bool },
}

impl UpstreamTarget {
    pub fn path(&self) -> &str {
        match self {
            UpstreamTarget::Backend { path } | UpstreamTarget::Cdn { path, .. } => path,
        }
    }
}

#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    started: Instant,
    /// Host the client addressed, forwarded as X-Forwarded-Host
    pub client_host: Option<String>,
    pub project_id: Option<i64>,
    pub kind: Option<ResolveKind>,
    pub target: Option<UpstreamTarget>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            client_host: None,
            project_id: None,
            kind: None,
            target: None,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
