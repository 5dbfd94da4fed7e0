//! Page cache decisions.
//!
//! The engine is consulted three times per request: before rendering to
//! try a hit, on the rendered response to stamp freshness, and after the
//! response went out to persist it with the tags gathered while it was
//! produced.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::control::{CacheControl, cacheable_lifetime};
use super::entry::{CacheEntry, EntryKey, HeaderValues, headers_to_map};
use super::error::StoreError;
use super::freshness::Directive;
use super::metrics::{
    METRIC_BYPASS_TOTAL, METRIC_HIT_TOTAL, METRIC_MISS_TOTAL, METRIC_STORE_FAILURE_TOTAL,
    METRIC_STORE_TOTAL,
};
use super::request::CacheRequest;
use super::store::CacheStore;
use super::tags::TagCollector;

/// A response as it was delivered, handed to the terminate phase.
#[derive(Debug, Clone)]
pub struct CompletedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// `None` when the body was streamed or too large to capture.
    pub body: Option<Bytes>,
    /// The response was replayed from the cache.
    pub replayed: bool,
}

impl CompletedResponse {
    pub fn rendered(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: Some(body.into()),
            replayed: false,
        }
    }
}

/// Why the terminate phase left a response out of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TagsDisabled,
    Ignored,
    CacheHit,
    MethodNotCacheable,
    NotCacheable,
    BodyUnavailable,
    ExpiryOutOfRange,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TagsDisabled => "tags_disabled",
            Self::Ignored => "ignored",
            Self::CacheHit => "cache_hit",
            Self::MethodNotCacheable => "method_not_cacheable",
            Self::NotCacheable => "not_cacheable",
            Self::BodyUnavailable => "body_unavailable",
            Self::ExpiryOutOfRange => "expiry_out_of_range",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum PersistOutcome {
    Stored {
        key: EntryKey,
        expires_at: OffsetDateTime,
        tags: usize,
    },
    Skipped(SkipReason),
    Failed(StoreError),
}

impl PersistOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

#[derive(Clone)]
pub struct CacheDecisionEngine {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
}

impl CacheDecisionEngine {
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Authenticated traffic never reads or writes the shared cache.
    pub fn ignore(&self, request: &CacheRequest) -> bool {
        request
            .session()
            .is_some_and(|session| session.is_authenticated())
    }

    /// Request phase: a live stored entry for this request, if any.
    pub async fn on_incoming_request(&self, request: &CacheRequest) -> Option<CacheEntry> {
        if self.ignore(request) {
            counter!(METRIC_BYPASS_TOTAL).increment(1);
            debug!(
                cache = "page",
                outcome = "bypass",
                uri = %request.uri(),
                method = %request.method(),
                "Authenticated request bypasses page cache"
            );
            return None;
        }

        if !self.config.serves_from_store() || !self.config.is_cacheable_method(request.method())
        {
            return None;
        }

        let lookup = self
            .store
            .get(request.uri(), request.method().as_str())
            .await;

        match lookup {
            Ok(entry) if !entry.is_expired(OffsetDateTime::now_utc()) => {
                counter!(METRIC_HIT_TOTAL).increment(1);
                debug!(
                    cache = "page",
                    outcome = "hit",
                    uri = %request.uri(),
                    method = %request.method(),
                    "Serving cached response"
                );
                Some(entry)
            }
            Ok(_) => {
                self.record_miss(request);
                None
            }
            Err(err) if err.is_not_found() => {
                self.record_miss(request);
                None
            }
            Err(err) => {
                counter!(METRIC_STORE_FAILURE_TOTAL, "op" => "get").increment(1);
                warn!(
                    cache = "page",
                    outcome = "failed",
                    uri = %request.uri(),
                    method = %request.method(),
                    error = %err,
                    "Cache lookup failed, rendering instead"
                );
                self.record_miss(request);
                None
            }
        }
    }

    fn record_miss(&self, request: &CacheRequest) {
        counter!(METRIC_MISS_TOTAL).increment(1);
        debug!(
            cache = "page",
            outcome = "miss",
            uri = %request.uri(),
            method = %request.method(),
            "Page cache miss"
        );
    }

    /// Response phase: stamp the first matching freshness rule onto
    /// `headers`, unless the response already declares `s-maxage`.
    pub fn on_outgoing_response(
        &self,
        request: &CacheRequest,
        headers: &mut HeaderMap,
    ) -> Option<Directive> {
        if self.ignore(request) || self.config.rules.is_empty() {
            return None;
        }

        let mut control = CacheControl::from_headers(headers);
        if control.has_shared_max_age() {
            return None;
        }

        let directive = *self.config.rules.resolve(request.path())?;
        directive.apply(&mut control);
        control.write_to(headers);

        debug!(
            cache = "page",
            path = %request.path(),
            cache_control = %control,
            "Applied freshness rule"
        );
        Some(directive)
    }

    /// Lifetime in seconds for a response that may be persisted.
    pub fn check_persistable(
        &self,
        request: &CacheRequest,
        status: StatusCode,
        headers: &HeaderMap,
        replayed: bool,
    ) -> Result<u64, SkipReason> {
        if !self.config.tags {
            return Err(SkipReason::TagsDisabled);
        }
        if self.ignore(request) {
            return Err(SkipReason::Ignored);
        }
        if replayed {
            return Err(SkipReason::CacheHit);
        }
        if !self.config.is_cacheable_method(request.method()) {
            return Err(SkipReason::MethodNotCacheable);
        }
        cacheable_lifetime(status, headers).ok_or(SkipReason::NotCacheable)
    }

    /// Terminate phase: persist the delivered response with its tags.
    ///
    /// Never fails; store errors are logged and reported in the outcome.
    pub async fn on_request_terminated(
        &self,
        request: &CacheRequest,
        response: CompletedResponse,
        tags: &TagCollector,
    ) -> PersistOutcome {
        let lifetime = match self.check_persistable(
            request,
            response.status,
            &response.headers,
            response.replayed,
        ) {
            Ok(lifetime) => lifetime,
            Err(reason) => return self.skip(request, reason),
        };

        let (body, headers) = if self.config.store {
            let Some(body) = response.body else {
                return self.skip(request, SkipReason::BodyUnavailable);
            };
            (body, headers_to_map(&response.headers))
        } else {
            (Bytes::new(), HeaderValues::new())
        };

        let now = OffsetDateTime::now_utc();
        let Some(expires_at) = i64::try_from(lifetime)
            .ok()
            .and_then(|secs| now.checked_add(Duration::seconds(secs)))
        else {
            return self.skip(request, SkipReason::ExpiryOutOfRange);
        };

        let entry = CacheEntry {
            uri: request.uri().to_string(),
            method: request.method().as_str().to_string(),
            body,
            headers,
            expires_at,
            status: response.status.as_u16(),
        };
        let key = entry.key();
        let tags = tags.drain();
        let tag_count = tags.len();

        match self.store.set(entry, tags).await {
            Ok(()) => {
                counter!(METRIC_STORE_TOTAL).increment(1);
                debug!(
                    cache = "page",
                    outcome = "stored",
                    uri = %key.uri,
                    method = %key.method,
                    ttl_secs = lifetime,
                    tags = tag_count,
                    "Stored response in page cache"
                );
                PersistOutcome::Stored {
                    key,
                    expires_at,
                    tags: tag_count,
                }
            }
            Err(err) => {
                counter!(METRIC_STORE_FAILURE_TOTAL, "op" => "set").increment(1);
                warn!(
                    cache = "page",
                    outcome = "failed",
                    uri = %key.uri,
                    method = %key.method,
                    error = %err,
                    "Failed to store response in page cache"
                );
                PersistOutcome::Failed(err)
            }
        }
    }

    fn skip(&self, request: &CacheRequest, reason: SkipReason) -> PersistOutcome {
        debug!(
            cache = "page",
            outcome = "skipped",
            uri = %request.uri(),
            method = %request.method(),
            reason = %reason,
            "Response not persisted"
        );
        PersistOutcome::Skipped(reason)
    }
}

impl fmt::Debug for CacheDecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheDecisionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
