//! Response cache middleware.
//!
//! The orchestrator around the request/response lifecycle: parses the
//! control flags, runs explicit eviction, serves hits (with
//! decompression), and captures pass-through responses for storage.
//! Caching is best-effort and strictly additive: no failure in here may
//! break the pass-through of an otherwise-successful response.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use tracing::{debug, instrument, warn};

use crate::codec::{self, Codec};
use crate::config::CacheConfig;
use crate::context::CacheContext;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::key;
use crate::metrics::CacheReport;

/// Control flags parsed from the request query string.
#[derive(Debug, Default)]
struct CacheFlags {
    use_cache: bool,
    evict: bool,
    evict_tags: Option<Vec<String>>,
    /// Summed seconds/minutes/hours overrides; unparseable values are
    /// ignored and fall back to the configured default.
    duration_override: Option<Duration>,
}

impl CacheFlags {
    fn parse(query: &str, config: &CacheConfig) -> Self {
        let mut flags = Self::default();
        let mut override_secs: Option<u64> = None;

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let name = name.as_ref();
            if name == config.use_cache_param {
                flags.use_cache = flag_is_set(&value);
            } else if name == config.evict_param {
                flags.evict = flag_is_set(&value);
            } else if name == config.evict_tags_param {
                let tags: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect();
                if !tags.is_empty() {
                    flags.evict_tags = Some(tags);
                }
            } else if name == config.cache_seconds_param {
                add_override(&mut override_secs, &value, 1);
            } else if name == config.cache_minutes_param {
                add_override(&mut override_secs, &value, 60);
            } else if name == config.cache_hours_param {
                add_override(&mut override_secs, &value, 3600);
            }
        }

        flags.duration_override = override_secs.map(Duration::from_secs);
        flags
    }
}

fn flag_is_set(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn add_override(total: &mut Option<u64>, value: &str, unit_secs: u64) {
    if let Ok(amount) = value.trim().parse::<u64>() {
        let seconds = amount.saturating_mul(unit_secs);
        *total = Some(total.unwrap_or(0).saturating_add(seconds));
    }
}

/// Logs when a pass-through is dropped before the response was captured;
/// the in-flight store attempt is abandoned without touching shared
/// state. Axum surfaces cancellation only as the future being dropped,
/// with no signal separating a client disconnect from any other abort,
/// so every abandonment is logged at debug rather than guessing which
/// kind it was.
struct StoreAttempt {
    key: String,
    armed: bool,
}

impl StoreAttempt {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StoreAttempt {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                key = %self.key,
                "request cancelled during pass-through, nothing stored"
            );
        }
    }
}

/// Response caching middleware.
///
/// Callers opt in per request: `useCache=true` enables lookup and
/// storage, `evict=true` removes the computed key (or, with `evictTags`,
/// every key under the listed tags). Without either flag the request
/// passes straight through.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(context): State<Arc<CacheContext>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let flags = CacheFlags::parse(request.uri().query().unwrap_or(""), context.config());
    if !flags.use_cache && !flags.evict {
        return next.run(request).await;
    }

    // Both eviction and lookup reuse the one computed key.
    let (request, cache_key) = keyed_request(request, context.config()).await;

    if flags.evict {
        context.evict(&cache_key, flags.evict_tags.as_deref());
    }

    if flags.use_cache {
        if let Some(entry) = context.store().get(&cache_key) {
            context.metrics().record_hit();
            match serve_hit(&entry) {
                Ok(response) => {
                    debug!(cache = "response", outcome = "hit", "serving cached response");
                    return response;
                }
                Err(err) => {
                    // Undecodable entry: drop it and fall through to the
                    // downstream handler so the client still gets a body.
                    warn!(key = %cache_key, error = %err, "cached payload undecodable, refreshing");
                    context.evict(&cache_key, None);
                }
            }
        } else {
            context.metrics().record_miss();
            debug!(cache = "response", outcome = "miss", "executing downstream handler");
        }
    }

    let attempt = StoreAttempt::new(&cache_key);
    let response = next.run(request).await;
    attempt.disarm();

    if !flags.use_cache || !should_store(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            // The origin reported success but its body stream died
            // mid-read; an empty 200 would hide that from the caller.
            warn!(key = %cache_key, error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if context.ensure_space(bytes.len() as u64) {
        let tags = tags_from_headers(&parts.headers, context.config());
        let headers = allow_listed_headers(&parts.headers, context.config());
        let ttl = flags
            .duration_override
            .unwrap_or_else(|| context.config().default_cache_duration());
        context.store_entry(&cache_key, headers, &bytes, tags, ttl);
    }

    Response::from_parts(parts, Body::from(bytes))
}

/// Serves the cache report as JSON; mount it wherever the deployment
/// exposes observability.
pub async fn cache_report_handler(State(context): State<Arc<CacheContext>>) -> Json<CacheReport> {
    Json(context.report())
}

/// Compute the cache key, buffering the request body for body-bearing
/// methods so the downstream handler can still read it.
async fn keyed_request(
    request: Request<Body>,
    config: &CacheConfig,
) -> (Request<Body>, String) {
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    let control = config.control_params();

    if !key::hashes_body(request.method()) {
        let cache_key = key::build_key(&path, &query, &control, None, &accept);
        return (request, cache_key);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => {
            let hash = key::hash_body(&bytes);
            let cache_key = key::build_key(&path, &query, &control, Some(&hash), &accept);
            (Request::from_parts(parts, Body::from(bytes)), cache_key)
        }
        Err(err) => {
            warn!(error = %err, "failed to buffer request body for key hashing");
            let cache_key = key::build_key(&path, &query, &control, None, &accept);
            (Request::from_parts(parts, Body::empty()), cache_key)
        }
    }
}

/// Build the response for a cache hit: allow-listed headers restored,
/// payload decompressed. An empty payload serves an empty success.
fn serve_hit(entry: &CacheEntry) -> Result<Response, CacheError> {
    if entry.payload.is_empty() {
        return Ok(StatusCode::OK.into_response());
    }

    let body = if entry.codec == Codec::None {
        entry.payload.to_vec()
    } else {
        codec::decompress(entry.codec, &entry.payload)?
    };

    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in &entry.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }

    builder
        .body(Body::from(body))
        .map_err(|err| CacheError::codec(format!("failed to rebuild cached response: {err}")))
}

/// Only successful, non-session, non-streaming responses are stored.
fn should_store(response: &Response) -> bool {
    if !response.status().is_success() {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    if response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
    {
        return false;
    }

    true
}

/// Tag list from the configured response header: comma-separated,
/// trimmed, deduplicated. Missing or malformed header means no tags.
fn tags_from_headers(headers: &HeaderMap, config: &CacheConfig) -> HashSet<String> {
    headers
        .get(&config.tags_header)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn allow_listed_headers(headers: &HeaderMap, config: &CacheConfig) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| config.is_header_allowed(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.to_string(), value.to_string()))
        })
        .collect()
}
