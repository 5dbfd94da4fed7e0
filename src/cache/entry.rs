//! Stored responses and their identity.

use std::collections::BTreeMap;
use std::fmt;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identity of a cache entry: `(method, uri)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub method: String,
    pub uri: String,
}

impl EntryKey {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
        }
    }

    pub fn for_request(method: &Method, uri: &str) -> Self {
        Self::new(method.as_str(), uri)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// Header name to ordered values; a header may repeat.
pub type HeaderValues = BTreeMap<String, Vec<String>>;

/// Marker extension on responses replayed from the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHit;

fn default_status() -> u16 {
    StatusCode::OK.as_u16()
}

/// A previously rendered response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub uri: String,
    pub method: String,
    /// Empty when the cache only records existence.
    pub body: Bytes,
    pub headers: HeaderValues,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(default = "default_status")]
    pub status: u16,
}

impl CacheEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.method.clone(), self.uri.clone())
    }

    /// An entry is dead once `now` is past `expires_at`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    /// Rebuild the stored response, marked with [`CacheHit`].
    pub fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let headers = headers_from_map(&self.headers);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.extensions_mut().insert(CacheHit);
        response
    }
}

/// Flatten a header map, keeping repeated values in order.
///
/// Values that are not visible ASCII cannot be replayed verbatim and are
/// left out.
pub fn headers_to_map(headers: &HeaderMap) -> HeaderValues {
    let mut map = HeaderValues::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    map
}

pub fn headers_from_map(map: &HeaderValues) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in map {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}
