//! Surrogate keys attached to cached responses.
//!
//! Surrogate keys are tags that allow bulk invalidation of related entries.
//! They travel in the space-separated `Surrogate-Key` header, so a key may
//! never be empty or contain a space.

use http::request::Parts;
use std::collections::HashSet;

/// Ordered, deduplicated set of normalized surrogate keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurrogateKeySet {
    keys: Vec<String>,
}

impl SurrogateKeySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one key. Empty keys are dropped, duplicates ignored.
    pub fn add(&mut self, key: impl AsRef<str>) -> &mut Self {
        if let Some(normalized) = normalize_key(key.as_ref())
            && !self.keys.contains(&normalized)
        {
            self.keys.push(normalized);
        }
        self
    }

    /// Add several keys in order.
    pub fn extend<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.add(key);
        }
        self
    }

    /// Copy of the keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.keys.clone()
    }

    /// Borrow the keys in insertion order.
    pub fn as_slice(&self) -> &[String] {
        &self.keys
    }

    /// Iterate over the keys.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Format keys as a space-separated header value.
    pub fn to_header(&self) -> String {
        self.keys.join(" ")
    }

    /// Parse keys from a header value.
    pub fn from_header(value: &str) -> Self {
        value.split_whitespace().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for SurrogateKeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a SurrogateKeySet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Normalize a surrogate key.
///
/// Strips surrounding whitespace and replaces spaces with hyphens. Returns
/// `None` when nothing is left.
pub fn normalize_key(key: &str) -> Option<String> {
    let normalized = key.trim().replace(' ', "-");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Values a dynamic tag function may return: one name, several, or none.
pub trait IntoTagNames {
    fn into_tag_names(self) -> Vec<String>;
}

impl IntoTagNames for String {
    fn into_tag_names(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTagNames for &str {
    fn into_tag_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTagNames for Vec<String> {
    fn into_tag_names(self) -> Vec<String> {
        self
    }
}

impl IntoTagNames for Vec<&str> {
    fn into_tag_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl<T: IntoTagNames> IntoTagNames for Option<T> {
    fn into_tag_names(self) -> Vec<String> {
        self.map(IntoTagNames::into_tag_names).unwrap_or_default()
    }
}

/// Authenticated user attached to a request as an extension.
///
/// Read by [`surrogate_from_user`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheUser(pub String);

/// Surrogate key from the request path.
///
/// `/api/products/123/` becomes `path-api-products-123`; the root path
/// becomes `path-root`.
pub fn surrogate_from_path(parts: &Parts) -> String {
    let trimmed = parts.uri.path().trim_matches('/');
    if trimmed.is_empty() {
        "path-root".to_string()
    } else {
        format!("path-{}", trimmed.replace('/', "-"))
    }
}

/// Surrogate key for a named view.
pub fn surrogate_from_view(view_name: &str) -> String {
    format!("view-{}", view_name)
}

/// Surrogate key for a model, optionally narrowed to one primary key.
///
/// ```
/// use pagecache_core::surrogates::surrogate_from_model;
///
/// assert_eq!(surrogate_from_model("Product", None::<u32>), "model-product");
/// assert_eq!(surrogate_from_model("Product", Some(123)), "model-product-123");
/// ```
pub fn surrogate_from_model<P: std::fmt::Display>(model_name: &str, pk: Option<P>) -> String {
    let key = format!("model-{}", model_name.to_lowercase());
    match pk {
        Some(pk) => format!("{}-{}", key, pk),
        None => key,
    }
}

/// Surrogate key for the authenticated user, if any.
pub fn surrogate_from_user(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<CacheUser>()
        .map(|user| format!("user-{}", user.0))
}

/// Surrogate keys from query parameters.
///
/// With `params = None` every parameter is used, in query order. Parameters
/// with an empty value are skipped.
pub fn surrogate_from_query_params(parts: &Parts, params: Option<&[&str]>) -> Vec<String> {
    let query: Vec<(String, String)> = parts
        .uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    let lookup = |name: &str| {
        query
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };

    let mut names: Vec<&str> = match params {
        Some(params) => params.to_vec(),
        None => query.iter().map(|(k, _)| k.as_str()).collect(),
    };
    let mut seen = HashSet::new();
    names.retain(|name| seen.insert(*name));

    names
        .into_iter()
        .filter_map(|name| match lookup(name) {
            Some(value) if !value.is_empty() => Some(format!("param-{}-{}", name, value)),
            _ => None,
        })
        .collect()
}
