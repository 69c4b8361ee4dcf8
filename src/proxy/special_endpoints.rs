//! Response generators for built-in endpoints and short-circuit answers.
//!
//! Functions return `EndpointResponse` instead of writing to the session,
//! which keeps them testable; the proxy writes the result.

use std::time::Instant;

use crate::store::StoreResult;

/// Every response may be embedded from any origin.
pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_METHODS: &str = "GET, HEAD, OPTIONS";
/// Sent when a preflight does not list the headers it wants.
pub const CORS_DEFAULT_ALLOW_HEADERS: &str = "Origin, Accept, Content-Type, X-Requested-With";

/// Response from a special endpoint handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// Headers beyond Content-Type, Content-Length and CORS origin
    pub headers: Vec<(&'static str, String)>,
}

impl EndpointResponse {
    /// Create a JSON response with the given status and body.
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
            headers: Vec::new(),
        }
    }

    /// Error response labelled with the status code's reason phrase.
    pub fn from_status(status: u16, message: &str) -> Self {
        let label = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Error");
        Self::error(status, label, message)
    }

    /// `{"error", "message", "status"}` body
    pub fn error(status: u16, error: &str, message: &str) -> Self {
        let body = serde_json::json!({
            "error": error,
            "message": message,
            "status": status
        })
        .to_string();
        Self::json(status, body)
    }
}

/// Generate response for /health endpoint.
pub fn handle_health(start_time: Instant) -> EndpointResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION")
    })
    .to_string();

    EndpointResponse::json(200, body)
}

/// Generate response for /ready endpoint from a store health check.
pub fn handle_ready(store_health: StoreResult<()>) -> EndpointResponse {
    match store_health {
        Ok(()) => EndpointResponse::json(
            200,
            serde_json::json!({ "status": "ready", "database": "healthy" }).to_string(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            EndpointResponse::json(
                503,
                serde_json::json!({ "status": "unavailable", "database": "unhealthy" })
                    .to_string(),
            )
        }
    }
}

/// Answer a CORS preflight. `requested_headers` is the client's
/// Access-Control-Request-Headers value.
pub fn handle_preflight(requested_headers: Option<&str>) -> EndpointResponse {
    let allow_headers = requested_headers
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(CORS_DEFAULT_ALLOW_HEADERS);

    EndpointResponse {
        status: 204,
        content_type: "text/plain",
        body: String::new(),
        headers: vec![
            ("Access-Control-Allow-Methods", CORS_ALLOW_METHODS.to_string()),
            ("Access-Control-Allow-Headers", allow_headers.to_string()),
        ],
    }
}

pub fn not_found(path: &str) -> EndpointResponse {
    EndpointResponse::error(404, "Not Found", &format!("No image route for {}", path))
}

pub fn unknown_project(uuid: &str) -> EndpointResponse {
    EndpointResponse::error(404, "Not Found", &format!("Unknown project '{}'", uuid))
}

pub fn method_not_allowed(method: &str) -> EndpointResponse {
    EndpointResponse::error(
        405,
        "Method Not Allowed",
        &format!("{} is not supported", method),
    )
}

pub fn store_unavailable() -> EndpointResponse {
    EndpointResponse::error(
        503,
        "Service Temporarily Unavailable",
        "Project lookup failed",
    )
}
