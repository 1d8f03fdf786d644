//! Expiry metadata for cached responses.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CACHE_CONTROL, EXPIRES};
use http::{HeaderValue, Response};
use std::time::Duration;

/// Format a timestamp as an HTTP date (RFC 7231 IMF-fixdate).
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Attach `Expires` and `Cache-Control: max-age` to a response.
///
/// `Expires` is only set when the response has none. An existing `max-age`
/// is kept if it is already shorter than `timeout`; other `Cache-Control`
/// directives are preserved.
pub fn patch_response_headers(response: &mut Response<Bytes>, timeout: Duration) {
    let seconds = timeout.as_secs();
    let headers = response.headers_mut();

    if !headers.contains_key(EXPIRES) {
        // Saturates at the latest representable date.
        let expires = chrono::Duration::try_seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Ok(value) = HeaderValue::from_str(&http_date(expires)) {
            headers.insert(EXPIRES, value);
        }
    }

    let existing = headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let merged = merge_max_age(existing, seconds);
    if let Ok(value) = HeaderValue::from_str(&merged) {
        headers.insert(CACHE_CONTROL, value);
    }
}

/// Merge `max-age={seconds}` into a `Cache-Control` value, keeping the
/// smaller age when one is already present.
fn merge_max_age(cache_control: &str, seconds: u64) -> String {
    let mut max_age = seconds;
    let mut directives = Vec::new();

    for directive in cache_control.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let lowered = directive.to_ascii_lowercase();
        match lowered.strip_prefix("max-age=") {
            Some(value) => {
                if let Ok(existing) = value.trim_matches('"').parse::<u64>() {
                    max_age = max_age.min(existing);
                }
            }
            None => directives.push(directive.to_string()),
        }
    }

    directives.push(format!("max-age={}", max_age));
    directives.join(", ")
}
