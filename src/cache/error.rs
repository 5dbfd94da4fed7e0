use thiserror::Error;

/// Failures reported by a [`CacheStore`](super::CacheStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lookup miss. Expected and silent; never surfaced as a failure.
    #[error("no cache entry for {method} {uri}")]
    NoSuchCacheEntry { method: String, uri: String },
    /// The backend could not complete the operation.
    #[error("cache store failure: {message}")]
    Failure { message: String },
}

impl StoreError {
    pub fn not_found(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::NoSuchCacheEntry {
            method: method.into(),
            uri: uri.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchCacheEntry { .. })
    }
}

/// A freshness rule whose path pattern does not compile.
#[derive(Debug, Error)]
#[error("malformed freshness rule `{pattern}`: {source}")]
pub struct MalformedFreshnessRule {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}
