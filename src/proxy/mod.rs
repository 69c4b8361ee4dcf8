// Proxy module - Pingora ProxyHttp implementation
// Routes transformation requests to the image backend or the CDN

pub mod context;
pub mod special_endpoints;

use async_trait::async_trait;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::Result;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{CdnConfig, Config, HitMode};
use crate::error::ResolveError;
use crate::resolver::{CacheResolver, ResolveRequest, ResolveResult};
use crate::router::{parse_route, Route};
use crate::signing::{cdn_public_path, encode_path};
use crate::store::{ImageStore, Project};

pub use context::{RequestContext, UpstreamTarget};
use special_endpoints::{EndpointResponse, CORS_ALLOW_ORIGIN};

/// What to do with a request before any store access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Answer directly
    Respond(EndpointResponse),
    /// Answer from a store health check
    Ready,
    /// Look up the project and resolve the transformation
    Resolve(Route),
}

/// Classify a request by method and path.
pub fn admit(
    method: &http::Method,
    path: &str,
    requested_headers: Option<&str>,
    start_time: Instant,
) -> Admission {
    if *method == http::Method::OPTIONS {
        return Admission::Respond(special_endpoints::handle_preflight(requested_headers));
    }
    if *method != http::Method::GET && *method != http::Method::HEAD {
        return Admission::Respond(special_endpoints::method_not_allowed(method.as_str()));
    }

    match path {
        "/health" => Admission::Respond(special_endpoints::handle_health(start_time)),
        "/ready" => Admission::Ready,
        _ => match parse_route(path) {
            Some(route) => Admission::Resolve(route),
            None => Admission::Respond(special_endpoints::not_found(path)),
        },
    }
}

/// How a resolved request reaches the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// 302 to this CDN URL
    Redirect(String),
    /// Proxy to this upstream
    Upstream(UpstreamTarget),
}

/// Turn a resolution into a redirect or an upstream target. Paths are
/// percent-encoded for the wire.
pub fn deliver(cdn: &CdnConfig, protocol: &str, result: ResolveResult) -> Delivery {
    match result {
        ResolveResult::Hit {
            cdn_relative_path, ..
        } => {
            let public_path = encode_path(&cdn_public_path(&cdn_relative_path, &cdn.result_storage));
            match cdn.hit_mode {
                HitMode::Redirect => Delivery::Redirect(cdn.public_url(protocol, &public_path)),
                HitMode::Proxy => Delivery::Upstream(UpstreamTarget::Cdn {
                    path: public_path,
                    tls: protocol == "https",
                }),
            }
        }
        ResolveResult::Miss { backend_path, .. } => Delivery::Upstream(UpstreamTarget::Backend {
            path: encode_path(&backend_path),
        }),
    }
}

/// JSON error for a failed resolution
pub fn resolve_error_response(error: &ResolveError) -> EndpointResponse {
    EndpointResponse::from_status(error.to_http_status(), &error.to_string())
}

/// ThumbgateProxy implements the Pingora ProxyHttp trait
/// Handles routing, project lookup and cache resolution
pub struct ThumbgateProxy {
    config: Arc<Config>,
    store: Arc<dyn ImageStore>,
    resolver: CacheResolver,
    /// Proxy start time (for uptime calculation in /health endpoint)
    start_time: Instant,
}

impl ThumbgateProxy {
    pub fn new(config: Config, store: Arc<dyn ImageStore>, resolver: CacheResolver) -> Self {
        Self {
            config: Arc::new(config),
            store,
            resolver,
            start_time: Instant::now(),
        }
    }

    /// Host the upstream request is addressed to
    fn target_host(&self, target: &UpstreamTarget) -> String {
        match target {
            UpstreamTarget::Backend { .. } => self.config.backend.host_name().to_string(),
            UpstreamTarget::Cdn { .. } => self.config.cdn.host_name().to_string(),
        }
    }
}

/// Write a complete JSON response and end the request.
async fn write_endpoint(session: &mut Session, response: EndpointResponse) -> Result<()> {
    let mut header = ResponseHeader::build(response.status, None)?;
    if !response.body.is_empty() {
        header.insert_header("Content-Type", response.content_type)?;
    }
    header.insert_header("Content-Length", response.body.len().to_string())?;
    header.insert_header("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN)?;
    for (name, value) in response.headers {
        header.insert_header(name, value)?;
    }

    session
        .write_response_header(Box::new(header), false)
        .await?;
    session
        .write_response_body(Some(response.body.into()), true)
        .await?;
    Ok(())
}

async fn write_redirect(session: &mut Session, location: &str) -> Result<()> {
    let mut header = ResponseHeader::build(302, None)?;
    header.insert_header("Location", location)?;
    header.insert_header("Content-Length", "0")?;
    header.insert_header("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN)?;

    session
        .write_response_header(Box::new(header), true)
        .await?;
    Ok(())
}

fn internal_error(message: impl Into<String>) -> Box<pingora_core::Error> {
    pingora_core::Error::explain(pingora_core::ErrorType::InternalError, message.into())
}

fn set_header(request: &mut RequestHeader, name: &'static str, value: &str) -> Result<()> {
    request.remove_header(name);
    let value = http::header::HeaderValue::from_str(value)
        .map_err(|e| internal_error(format!("Invalid {} header: {}", name, e)))?;
    request
        .append_header(name, value)
        .map_err(|e| internal_error(format!("Failed to set {} header: {}", name, e)))?;
    Ok(())
}

#[async_trait]
impl ProxyHttp for ThumbgateProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    /// Determine the upstream peer chosen in request_filter
    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let target = ctx
            .target
            .as_ref()
            .ok_or_else(|| internal_error("No upstream target in context"))?;

        let peer = match target {
            UpstreamTarget::Backend { .. } => {
                let (host, port) = self.config.backend.peer_endpoint();
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    host = %host,
                    port = port,
                    "Forwarding miss to image backend"
                );
                let mut peer = Box::new(HttpPeer::new((host, port), false, String::new()));
                let timeout = self.config.backend.timeout();
                peer.options.connection_timeout = Some(timeout);
                peer.options.read_timeout = Some(timeout);
                peer.options.write_timeout = Some(timeout);
                peer
            }
            UpstreamTarget::Cdn { tls, .. } => {
                let (host, port) = self.config.cdn.peer_endpoint(*tls);
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    host = %host,
                    port = port,
                    tls = *tls,
                    "Proxying hit from CDN"
                );
                let sni = self.config.cdn.host_name().to_string();
                Box::new(HttpPeer::new((host, port), *tls, sni))
            }
        };

        Ok(peer)
    }

    /// Route, look up the project and resolve the transformation
    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let req = session.req_header();
        ctx.client_host = req
            .headers
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| req.uri.host().map(str::to_string));
        let requested_headers = req
            .headers
            .get(http::header::ACCESS_CONTROL_REQUEST_HEADERS)
            .and_then(|v| v.to_str().ok());

        let route = match admit(&req.method, req.uri.path(), requested_headers, self.start_time) {
            Admission::Respond(response) => {
                write_endpoint(session, response).await?;
                return Ok(true);
            }
            Admission::Ready => {
                let health = self.store.health_check().await;
                write_endpoint(session, special_endpoints::handle_ready(health)).await?;
                return Ok(true);
            }
            Admission::Resolve(route) => route,
        };

        let project = match self.store.find_active_project(&route.project_uuid).await {
            Ok(Some(row)) => Project::from_row(row, self.config.backend.secret.clone()),
            Ok(None) => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    project = %route.project_uuid,
                    "Unknown or inactive project"
                );
                write_endpoint(
                    session,
                    special_endpoints::unknown_project(&route.project_uuid),
                )
                .await?;
                return Ok(true);
            }
            Err(e) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    project = %route.project_uuid,
                    error = %e,
                    "Project lookup failed"
                );
                write_endpoint(session, special_endpoints::store_unavailable()).await?;
                return Ok(true);
            }
        };
        ctx.project_id = Some(project.id);

        let protocol = project.protocol.clone();
        let request = ResolveRequest {
            project,
            origin_path: route.image,
            transformation: route.transformation,
            smart: route.smart,
        };

        let resolution = match self.resolver.resolve(request).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::info!(
                    request_id = %ctx.request_id(),
                    error = %e,
                    "Rejecting transformation"
                );
                write_endpoint(session, resolve_error_response(&e)).await?;
                return Ok(true);
            }
        };
        ctx.kind = Some(resolution.result.kind());

        // Bookkeeping runs detached; the response never waits on it.
        drop(resolution.bookkeeping);

        match deliver(&self.config.cdn, &protocol, resolution.result) {
            Delivery::Redirect(location) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    location = %location,
                    "Redirecting hit to CDN"
                );
                write_redirect(session, &location).await?;
                Ok(true)
            }
            Delivery::Upstream(target) => {
                ctx.target = Some(target);
                Ok(false) // Continue to upstream
            }
        }
    }

    /// Rewrite URI and Host for the chosen upstream
    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        let target = ctx
            .target
            .as_ref()
            .ok_or_else(|| internal_error("No upstream target in context"))?;

        let parsed_uri = target
            .path()
            .parse()
            .map_err(|e: http::uri::InvalidUri| internal_error(format!("Invalid URI: {}", e)))?;
        upstream_request.set_uri(parsed_uri);

        let target_host = self.target_host(target);
        let forwarded_host = ctx.client_host.clone().unwrap_or_default();

        set_header(upstream_request, "Host", &target_host)?;
        if !forwarded_host.is_empty() {
            set_header(upstream_request, "X-Forwarded-Host", &forwarded_host)?;
        }
        set_header(upstream_request, "X-Origin-Host", &target_host)?;

        tracing::debug!(
            request_id = %ctx.request_id(),
            upstream_host = %target_host,
            upstream_path = %target.path(),
            "Forwarding request"
        );

        Ok(())
    }

    /// Tag proxied responses with the request id and CORS origin
    fn upstream_response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        upstream_response.insert_header("X-Request-ID", ctx.request_id())?;
        upstream_response.insert_header("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN)?;
        Ok(())
    }

    /// Log request completion
    async fn logging(
        &self,
        session: &mut Session,
        e: Option<&pingora_core::Error>,
        ctx: &mut Self::CTX,
    ) {
        let status_code = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(500);

        let path = session.req_header().uri.path().to_string();
        let kind = ctx.kind.map(|k| format!("{:?}", k).to_lowercase());

        if let Some(error) = e {
            tracing::warn!(
                request_id = %ctx.request_id(),
                path = %path,
                status = status_code,
                project_id = ?ctx.project_id,
                cache = ?kind,
                duration_ms = ctx.elapsed_ms() as u64,
                error = %error,
                "Request failed"
            );
        } else {
            tracing::info!(
                request_id = %ctx.request_id(),
                path = %path,
                status = status_code,
                project_id = ?ctx.project_id,
                cache = ?kind,
                duration_ms = ctx.elapsed_ms() as u64,
                "Request completed"
            );
        }
    }
}
