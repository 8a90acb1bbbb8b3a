//! Cache key generation.
//!
//! A key is a deterministic function of the request path, its sorted
//! non-control query parameters, a body hash for body-bearing methods,
//! and the raw `Accept` header value. Percent-encoding is not normalized
//! beyond what the query parser exposes: two byte-identical raw requests
//! always agree, differently-encoded equivalents may miss each other.

use axum::http::Method;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};

/// True when the method's body participates in the cache key.
pub(crate) fn hashes_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Base64 of the SHA-256 digest of the raw body bytes.
pub fn hash_body(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    STANDARD.encode(hasher.finalize())
}

/// Build a cache key from normalized request attributes.
///
/// Layout: `path?sorted-query` then `|body-hash` when present, then
/// `|accept`. Control parameters named in `control_params` are stripped
/// from the query before sorting.
pub fn build_key(
    path: &str,
    query: &str,
    control_params: &[&str],
    body_hash: Option<&str>,
    accept: &str,
) -> String {
    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| !control_params.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    // Stable sort: duplicate keys keep their original relative order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut key = String::with_capacity(path.len() + query.len() + accept.len() + 64);
    key.push_str(path);
    key.push('?');
    for (index, (name, value)) in pairs.iter().enumerate() {
        if index > 0 {
            key.push('&');
        }
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    if let Some(hash) = body_hash {
        key.push('|');
        key.push_str(hash);
    }
    key.push('|');
    key.push_str(accept);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: [&str; 6] = [
        "useCache",
        "evict",
        "evictTags",
        "cacheSeconds",
        "cacheMinutes",
        "cacheHours",
    ];

    #[test]
    fn identical_inputs_yield_identical_keys() {
        let a = build_key("/reports", "b=2&a=1", &CONTROL, None, "text/html");
        let b = build_key("/reports", "b=2&a=1", &CONTROL, None, "text/html");
        assert_eq!(a, b);
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = build_key("/reports", "b=2&a=1", &CONTROL, None, "text/html");
        let b = build_key("/reports", "a=1&b=2", &CONTROL, None, "text/html");
        assert_eq!(a, b);
    }

    #[test]
    fn control_parameters_are_stripped() {
        let plain = build_key("/reports", "a=1", &CONTROL, None, "*/*");
        let flagged = build_key(
            "/reports",
            "a=1&useCache=true&evict=true&cacheSeconds=30",
            &CONTROL,
            None,
            "*/*",
        );
        assert_eq!(plain, flagged);
    }

    #[test]
    fn path_change_changes_key() {
        let a = build_key("/reports", "a=1", &CONTROL, None, "*/*");
        let b = build_key("/invoices", "a=1", &CONTROL, None, "*/*");
        assert_ne!(a, b);
    }

    #[test]
    fn accept_header_changes_key() {
        let a = build_key("/reports", "a=1", &CONTROL, None, "text/html");
        let b = build_key("/reports", "a=1", &CONTROL, None, "application/json");
        assert_ne!(a, b);
    }

    #[test]
    fn body_hash_changes_key() {
        let hash_a = hash_body(b"payload one");
        let hash_b = hash_body(b"payload two");
        let a = build_key("/reports", "", &CONTROL, Some(&hash_a), "*/*");
        let b = build_key("/reports", "", &CONTROL, Some(&hash_b), "*/*");
        assert_ne!(a, b);
    }

    #[test]
    fn body_hash_is_deterministic() {
        assert_eq!(hash_body(b"same bytes"), hash_body(b"same bytes"));
        assert_ne!(hash_body(b"same bytes"), hash_body(b"other bytes"));
    }

    #[test]
    fn only_mutating_methods_hash_bodies() {
        assert!(hashes_body(&Method::POST));
        assert!(hashes_body(&Method::PUT));
        assert!(hashes_body(&Method::PATCH));
        assert!(hashes_body(&Method::DELETE));
        assert!(!hashes_body(&Method::GET));
        assert!(!hashes_body(&Method::HEAD));
    }
}
