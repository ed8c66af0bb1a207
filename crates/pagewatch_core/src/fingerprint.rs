//! Fingerprint derivation and the cache-busting URL convention.
//!
//! A fingerprint is an opaque comparable string standing in for "current
//! content version" of a resource. `ETag` is sufficient alone; otherwise a
//! composite of `Content-Type`, `Content-Length` and a compacted
//! `Last-Modified` is used; a plain response body is the last resort, which
//! is what forces the GET fallback for servers that return no usable
//! headers on HEAD.

/// Reserved query parameter appended to fingerprinting requests to defeat
/// intermediate caches, and stripped again before URLs are stored or
/// compared.
pub const NO_CACHE_PARAM: &str = "_w_";

const COMPOSITE_SEPARATOR: char = '~';

/// Headers and body of a completed fingerprinting exchange.
///
/// `body` is `None` for HEAD responses; header fields are `None` when the
/// server omitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReply {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub body: Option<String>,
}

/// Derives a fingerprint from a completed exchange, or `None` when the
/// response carries nothing usable (forcing the alternate-method retry).
pub fn compute(reply: &ProbeReply) -> Option<String> {
    // ETag alone is enough.
    if let Some(etag) = non_empty(reply.etag.as_deref()) {
        return Some(etag.to_string());
    }

    let content_type = non_empty(reply.content_type.as_deref());
    let content_length = non_empty(reply.content_length.as_deref());
    let last_modified = non_empty(reply.last_modified.as_deref()).map(compact_http_date);

    if content_type.is_some() || content_length.is_some() || last_modified.is_some() {
        let mut composite = String::new();
        composite.push_str(content_type.unwrap_or(""));
        composite.push(COMPOSITE_SEPARATOR);
        composite.push_str(content_length.unwrap_or(""));
        composite.push(COMPOSITE_SEPARATOR);
        composite.push_str(last_modified.as_deref().unwrap_or(""));
        return Some(composite);
    }

    reply
        .body
        .as_deref()
        .and_then(|body| non_empty(Some(body)))
        .map(str::to_string)
}

/// Compacts an HTTP date to base-36 Unix seconds; unparseable values pass
/// through unchanged so they still compare stably.
pub fn compact_http_date(value: &str) -> String {
    match chrono::DateTime::parse_from_rfc2822(value) {
        Ok(parsed) => to_base36(parsed.timestamp().max(0) as u64),
        Err(_) => value.to_string(),
    }
}

/// Cache-busting token for a request issued at `now_ms` (Unix milliseconds):
/// masked to 22 bits and base-36 encoded to stay short.
pub fn cache_token(now_ms: u64) -> String {
    to_base36(now_ms & 0x3F_FFFF)
}

/// Appends a fresh cache-busting parameter to `url`, replacing any previous
/// one.
pub fn cache_busted(url: &str, now_ms: u64) -> String {
    let base = strip_cache_param(url);
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{NO_CACHE_PARAM}={}", cache_token(now_ms))
}

/// Removes the cache-busting parameter from a URL or path, leaving the rest
/// of the query intact.
pub fn strip_cache_param(url: &str) -> String {
    match url.split_once('?') {
        None => url.to_string(),
        Some((base, query)) => {
            let stripped = strip_query_cache_param(query);
            if stripped.is_empty() {
                base.to_string()
            } else {
                format!("{base}?{stripped}")
            }
        }
    }
}

/// Removes the cache-busting pair from a raw query string.
pub(crate) fn strip_query_cache_param(query: &str) -> String {
    let prefix = format!("{NO_CACHE_PARAM}=");
    query
        .split('&')
        .filter(|pair| !pair.starts_with(prefix.as_str()))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase base-36 rendering of `value`.
pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
