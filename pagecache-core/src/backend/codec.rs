//! Stored representation of a cached response.

use crate::error::{CacheError, CacheResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Headers kept when a response is stored.
pub const CACHEABLE_HEADERS: [&str; 5] =
    ["Cache-Control", "Expires", "ETag", "Last-Modified", "Vary"];

/// Content type assumed when a response carries none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Encoded response: base64 body, status, content type and the allow-listed
/// headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub content: String,
    pub content_type: String,
    pub status_code: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl StoredResponse {
    /// Capture a response.
    pub fn from_response(response: &Response<Bytes>) -> Self {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let headers = CACHEABLE_HEADERS
            .iter()
            .filter_map(|name| {
                let value = response.headers().get(*name)?.to_str().ok()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        Self {
            content: STANDARD.encode(response.body()),
            content_type,
            status_code: response.status().as_u16(),
            headers,
        }
    }

    /// Rebuild the response.
    pub fn into_response(self) -> CacheResult<Response<Bytes>> {
        let body = STANDARD
            .decode(self.content.as_bytes())
            .map_err(|e| CacheError::Deserialization(format!("invalid body encoding: {}", e)))?;
        let status = StatusCode::from_u16(self.status_code)
            .map_err(|e| CacheError::Deserialization(e.to_string()))?;

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, header_value(&self.content_type)?);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| CacheError::Deserialization(e.to_string()))?;
            headers.insert(name, header_value(value)?);
        }

        Ok(response)
    }

    pub fn encode(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> CacheResult<Self> {
        serde_json::from_str(raw).map_err(|e| CacheError::Deserialization(e.to_string()))
    }
}

fn header_value(value: &str) -> CacheResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| CacheError::Deserialization(e.to_string()))
}
