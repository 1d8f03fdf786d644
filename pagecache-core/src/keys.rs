//! Cache key construction.
//!
//! Final keys are digests of `"{prefix}:{versions}:{request key}"`, so stored
//! keys have a fixed length whatever the request looks like.

use http::request::Parts;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Hash a raw key into a fixed-size hex string.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Build the final cache key.
///
/// # Arguments
///
/// * `prefix` - Optional key prefix; `None` contributes an empty segment
/// * `version_parts` - Ordered `"tag:version"` components of versioned tags
/// * `request_key` - The request-derived key
///
/// # Examples
///
/// ```
/// use pagecache_core::keys::{build_key, hash_key};
///
/// let parts = vec!["catalog:1".to_string()];
/// let key = build_key(Some("shop"), &parts, "/products/7");
/// assert_eq!(key, hash_key("shop:catalog:1:/products/7"));
/// ```
pub fn build_key(prefix: Option<&str>, version_parts: &[String], request_key: &str) -> String {
    let raw = format!(
        "{}:{}:{}",
        prefix.unwrap_or_default(),
        version_parts.join(","),
        request_key
    );
    hash_key(&raw)
}

/// Build a key from the request's query parameters.
///
/// Parameters are sorted case-insensitively by name and rendered as
/// `name:value` joined by `-`. For repeated names the last value wins.
pub fn generate_query_params_cache_key(parts: &Parts) -> String {
    let mut params: HashMap<String, String> = HashMap::new();
    if let Some(query) = parts.uri.query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(name.into_owned(), value.into_owned());
        }
    }

    let mut names: Vec<&String> = params.keys().collect();
    names.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then(a.cmp(b)));

    names
        .into_iter()
        .map(|name| format!("{}:{}", name, params[name]))
        .collect::<Vec<_>>()
        .join("-")
}

/// Build a key from the query parameters and the request path.
///
/// Hyphens are stripped from the path.
pub fn generate_cache_key(parts: &Parts) -> String {
    format!(
        "{}-{}",
        generate_query_params_cache_key(parts),
        parts.uri.path().replace('-', "")
    )
}
