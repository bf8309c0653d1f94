//! Request dispatching: the per-request pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → build RequestContext
//!     → rule engine (reject/redirect short-circuit; route-to-pool pins;
//!       modify-request mutates and falls through)
//!     → rate limiter (429 on deny)
//!     → cache lookup (serve on hit)
//!     → pool selection (sticky-aware, priority order)
//!     → forward (X-Forwarded-* injected, hard timeout)
//!     → on backend error: one retry against a different server, else 502
//!     → optional gzip, optional cache store
//!     → metrics recorded on every exit path
//! ```
//!
//! # Design Decisions
//! - The request body is buffered (bounded) so a retry can replay it
//! - Upstream bodies are buffered only when caching/compression may
//!   apply and the declared length fits; otherwise they stream through
//! - Passive failure signals feed error rate, never health status

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{
    header, request::Parts, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri,
};
use tracing::{debug, warn};

use crate::cache::policy;
use crate::engine::Engine;
use crate::error::ProxyError;
use crate::http::request::RequestContext;
use crate::http::response::{
    accepts_gzip, error_response, gzip, should_compress, structured_response,
};
use crate::load_balancer::backend::ConnectionGuard;
use crate::load_balancer::SelectionContext;
use crate::observability::metrics::{self, Outcome};
use crate::resilience::retry_delay;
use crate::routing::RuleOutcome;

/// Total forwarding attempts per request (initial + one failover retry).
const MAX_ATTEMPTS: u32 = 2;

/// Upstream bodies above this are streamed through uncompressed/uncached.
const MAX_BUFFERED_RESPONSE: u64 = 4 * 1024 * 1024;

/// Headers that must not travel between hops.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Serve one inbound request end to end.
pub async fn dispatch(
    engine: Arc<Engine>,
    client_addr: SocketAddr,
    request: Request<Body>,
) -> Response<Body> {
    let (mut parts, body) = request.into_parts();

    let request_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let path = parts.uri.path().to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut ctx = RequestContext::new(
        request_id,
        client_addr,
        parts.method.clone(),
        path.clone(),
        None,
        &parts.headers,
    );

    debug!(
        request_id = %ctx.id,
        method = %ctx.method,
        path = %path,
        client = %ctx.client_ip,
        "dispatching request"
    );

    // 1. Rules. Terminal actions answer here; modify-request already
    // mutated the headers we forward.
    let mut pinned_pool: Option<String> = None;
    match engine.rules().evaluate(
        &path,
        &parts.method,
        Some(ctx.client_ip),
        &mut parts.headers,
    ) {
        Some(RuleOutcome::Reject {
            rule_id,
            status,
            message,
        }) => {
            debug!(request_id = %ctx.id, rule = %rule_id, "request rejected by rule");
            let error = ProxyError::Rejected { status, message };
            return finish(&engine, &ctx, error_response(&error, &ctx.id), Outcome::Failure, 0);
        }
        Some(RuleOutcome::Redirect {
            rule_id,
            location,
            status,
        }) => {
            debug!(request_id = %ctx.id, rule = %rule_id, "request redirected by rule");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            if let Ok(value) = HeaderValue::try_from(location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            return finish(&engine, &ctx, response, Outcome::Success, 0);
        }
        Some(RuleOutcome::RouteToPool { pool, .. }) => pinned_pool = Some(pool),
        None => {}
    }

    // 2. Admission control.
    if engine.limiter().is_enabled() {
        let key = ctx.rate_limit_key(&engine.config.rate_limit, &parts.headers);
        if engine.limiter().check(&key) == crate::security::rate_limit::Admission::Denied {
            warn!(request_id = %ctx.id, key = %key, "rate limit exceeded");
            metrics::record_rate_limited(match engine.config.rate_limit.key {
                crate::config::schema::RateLimitKey::Ip => "ip",
                crate::config::schema::RateLimitKey::Header => "header",
            });
            return finish(
                &engine,
                &ctx,
                error_response(&ProxyError::RateLimited, &ctx.id),
                Outcome::Failure,
                0,
            );
        }
    }

    // 3. Cache lookup.
    let cache_eligible = engine.cache().is_enabled()
        && policy::request_cacheable(engine.cache().config(), &ctx.method, &path)
        && policy::request_allows_cache(&parts.headers);
    let cache_key = cache_eligible.then(|| {
        policy::cache_key(
            engine.cache().config(),
            &ctx.method,
            &path_and_query,
            &parts.headers,
        )
    });

    if let Some(key) = cache_key {
        if let Some(entry) = engine.cache().get(key) {
            metrics::record_cache(true);
            ctx.cache_hit = true;
            debug!(request_id = %ctx.id, "cache hit");

            let mut response = Response::new(Body::from(entry.body.clone()));
            *response.status_mut() = entry.status;
            *response.headers_mut() = entry.headers.clone();
            response
                .headers_mut()
                .insert("x-cache", HeaderValue::from_static("HIT"));
            let bytes = entry.body.len() as u64;
            return finish(&engine, &ctx, response, Outcome::Success, bytes);
        }
        metrics::record_cache(false);
    }

    // 4. Buffer the request body so retries can replay it.
    let body_bytes =
        match axum::body::to_bytes(body, engine.config.listener.max_body_size).await {
            Ok(bytes) => bytes,
            Err(_) => {
                let response = structured_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Payload Too Large",
                    &ctx.id,
                );
                return finish(&engine, &ctx, response, Outcome::Failure, 0);
            }
        };

    // 5. Selection, forwarding, retry.
    let accept_gzip = accepts_gzip(&parts.headers);
    let mut tried: Vec<String> = Vec::new();

    loop {
        let attempt = tried.len() as u32;
        let selection = SelectionContext {
            client_ip: Some(ctx.client_ip),
        };
        let guard = match &pinned_pool {
            Some(pool_id) => engine
                .pools()
                .get(pool_id)
                .filter(|p| p.is_enabled())
                .and_then(|p| p.select(&selection, &parts.headers, &tried)),
            None => engine.pools().select(&selection, &parts.headers, &tried),
        };

        let Some(guard) = guard else {
            // Nothing eligible: 503 on the first attempt, 502 once a
            // backend already failed us.
            let error = if attempt == 0 {
                ProxyError::NoHealthyBackend
            } else {
                ProxyError::Backend("no alternate backend for retry".to_string())
            };
            warn!(request_id = %ctx.id, attempt, "no backend available");
            return finish(&engine, &ctx, error_response(&error, &ctx.id), Outcome::Failure, 0);
        };

        ctx.selected_backend = Some(guard.id.clone());
        ctx.retry_count = attempt;
        tried.push(guard.id.clone());

        let attempt_started = std::time::Instant::now();
        match forward_once(&engine, &ctx, &parts, &path_and_query, &body_bytes, &guard).await {
            Ok(upstream) => {
                guard.record_response_time(attempt_started.elapsed().as_secs_f64() * 1000.0);
                let status = upstream.status();
                // 5xx feeds the error rate; health status stays with the
                // prober.
                guard.record_result(!status.is_server_error());
                let backend_id = guard.id.clone();
                drop(guard);

                let response = finalize_upstream_response(
                    &engine,
                    &mut ctx,
                    upstream,
                    cache_key,
                    accept_gzip,
                )
                .await;
                let outcome = if status.is_server_error() {
                    Outcome::Failure
                } else {
                    Outcome::Success
                };
                let bytes = response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                metrics::record_request(
                    ctx.method.as_str(),
                    status.as_u16(),
                    &backend_id,
                    ctx.started,
                );
                engine.metrics().record(
                    outcome,
                    status.as_u16(),
                    Some(&backend_id),
                    ctx.started.elapsed(),
                    bytes,
                );
                return response;
            }
            Err(error) => {
                guard.record_result(false);
                warn!(
                    request_id = %ctx.id,
                    backend = %guard.id,
                    attempt,
                    error = %error,
                    "forward attempt failed"
                );
                drop(guard);

                if error.is_retryable() && attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(retry_delay(&engine.config.upstream, attempt + 1)).await;
                    continue;
                }
                return finish(&engine, &ctx, error_response(&error, &ctx.id), Outcome::Failure, 0);
            }
        }
    }
}

/// One forwarding attempt with the hard upstream deadline.
async fn forward_once(
    engine: &Engine,
    ctx: &RequestContext,
    parts: &Parts,
    path_and_query: &str,
    body: &Bytes,
    guard: &ConnectionGuard,
) -> Result<Response<hyper::body::Incoming>, ProxyError> {
    let uri: Uri = format!("{}{}", guard.base_url, path_and_query)
        .parse()
        .map_err(|e| ProxyError::Backend(format!("bad upstream uri: {}", e)))?;

    let mut builder = Request::builder()
        .method(parts.method.clone())
        .uri(uri)
        .version(hyper::Version::HTTP_11);

    if let Some(headers) = builder.headers_mut() {
        copy_forward_headers(headers, &parts.headers, ctx, engine, guard);
    }

    let request = builder
        .body(Body::from(body.clone()))
        .map_err(|e| ProxyError::Backend(format!("failed to build upstream request: {}", e)))?;

    let deadline = Duration::from_secs(engine.config.upstream.timeout_secs);
    let client = engine.client().for_backend(guard.backend());
    match tokio::time::timeout(deadline, client.request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(ProxyError::Backend(e.to_string())),
        Err(_) => Err(ProxyError::Timeout),
    }
}

/// Copy request headers to the upstream request, stripping hop-by-hop
/// headers and injecting the forwarding set.
fn copy_forward_headers(
    out: &mut HeaderMap,
    original: &HeaderMap,
    ctx: &RequestContext,
    engine: &Engine,
    guard: &ConnectionGuard,
) {
    let original_host = original
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    for (name, value) in original.iter() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) || name == &header::HOST {
            continue;
        }
        out.insert(name.clone(), value.clone());
    }

    // Host must name the upstream authority.
    if let Some(authority) = guard.base_url.split("://").nth(1) {
        if let Ok(value) = HeaderValue::try_from(authority) {
            out.insert(header::HOST, value);
        }
    }

    // X-Forwarded-For grows by one hop.
    let forwarded_for = match original
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) => format!("{}, {}", existing, ctx.client_ip),
        None => ctx.client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::try_from(forwarded_for) {
        out.insert("x-forwarded-for", value);
    }

    let proto = if engine.config.listener.tls.is_some() {
        "https"
    } else {
        "http"
    };
    out.insert("x-forwarded-proto", HeaderValue::from_static(proto));

    if let Some(host) = original_host {
        if let Ok(value) = HeaderValue::try_from(host) {
            out.insert("x-forwarded-host", value);
        }
    }

    if let Ok(value) = HeaderValue::try_from(ctx.id.as_str()) {
        out.insert("x-request-id", value);
    }
}

/// Turn the upstream response into the client response: strip hop-by-hop
/// headers, then cache and compress when eligible.
async fn finalize_upstream_response(
    engine: &Engine,
    ctx: &mut RequestContext,
    upstream: Response<hyper::body::Incoming>,
    cache_key: Option<u64>,
    accept_gzip: bool,
) -> Response<Body> {
    let (mut parts, body) = upstream.into_parts();
    for name in HOP_BY_HOP_HEADERS {
        parts.headers.remove(*name);
    }

    let store_eligible = cache_key.is_some()
        && policy::response_cacheable(parts.status, &parts.headers);
    let compress_eligible = accept_gzip
        && engine.config.compression.enabled
        && parts.status.is_success();

    // Stream straight through when nothing downstream needs the bytes,
    // the length is undeclared, or the body is too large to hold.
    let declared_len = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let buffer = (store_eligible || compress_eligible)
        && declared_len.is_some_and(|len| len <= MAX_BUFFERED_RESPONSE);
    if !buffer {
        return Response::from_parts(parts, Body::new(body));
    }

    let bytes = match axum::body::to_bytes(Body::new(body), MAX_BUFFERED_RESPONSE as usize).await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(request_id = %ctx.id, error = %e, "failed to read upstream body");
            return error_response(&ProxyError::Backend("upstream body read failed".into()), &ctx.id);
        }
    };

    if store_eligible {
        if let Some(key) = cache_key {
            engine
                .cache()
                .put(key, parts.status, parts.headers.clone(), bytes.clone());
        }
    }

    let (final_bytes, compressed) = if compress_eligible
        && should_compress(&engine.config.compression, bytes.len(), &parts.headers)
    {
        match gzip(&bytes) {
            Some(compressed) => (compressed, true),
            None => (bytes, false),
        }
    } else {
        (bytes, false)
    };

    if compressed {
        ctx.compressed = true;
        parts
            .headers
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        parts.headers.insert(
            header::VARY,
            HeaderValue::from_static("accept-encoding"),
        );
    }
    parts.headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(final_bytes.len() as u64),
    );

    Response::from_parts(parts, Body::from(final_bytes))
}

/// Record metrics for a locally produced response and return it. Every
/// exit path that skips the forwarding step funnels through here.
fn finish(
    engine: &Engine,
    ctx: &RequestContext,
    response: Response<Body>,
    outcome: Outcome,
    bytes: u64,
) -> Response<Body> {
    metrics::record_request(
        ctx.method.as_str(),
        response.status().as_u16(),
        ctx.selected_backend.as_deref().unwrap_or("none"),
        ctx.started,
    );
    engine.metrics().record(
        outcome,
        response.status().as_u16(),
        ctx.selected_backend.as_deref(),
        ctx.started.elapsed(),
        bytes,
    );
    response
}
