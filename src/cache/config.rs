//! Page cache configuration.
//!
//! Built from the validated `[cache]` settings; patterns are already
//! compiled by the time a `CacheConfig` exists.

use std::num::NonZeroUsize;
use std::time::Duration;

use axum::http::Method;

use super::freshness::FreshnessRules;

pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MEMORY_ENTRY_LIMIT: usize = 1024;
pub const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
pub const DEFAULT_MAX_EVENT_QUEUE_LEN: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve hits from the store and retain bodies and headers on write.
    pub store: bool,
    /// Track entity tags; without it nothing is read or written.
    pub tags: bool,
    /// Ordered freshness rules, first match wins.
    pub rules: FreshnessRules,
    /// Largest response body buffered for storage.
    pub body_limit_bytes: usize,
    /// Capacity of the in-memory store.
    pub memory_entry_limit: usize,
    pub cacheable_methods: Vec<Method>,
    /// Background invalidation interval when consumption is deferred.
    pub auto_consume_interval_ms: u64,
    /// Maximum invalidation events per consumption pass.
    pub consume_batch_limit: usize,
    /// Pending invalidation events kept before the oldest is dropped.
    pub max_event_queue_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: false,
            tags: false,
            rules: FreshnessRules::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            memory_entry_limit: DEFAULT_MEMORY_ENTRY_LIMIT,
            cacheable_methods: default_cacheable_methods(),
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            max_event_queue_len: DEFAULT_MAX_EVENT_QUEUE_LEN,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            store: settings.store,
            tags: settings.tags,
            rules: settings.expiries.clone(),
            body_limit_bytes: settings.body_limit_bytes.get(),
            memory_entry_limit: settings.memory_entry_limit.get(),
            cacheable_methods: settings.cacheable_methods.clone(),
            auto_consume_interval_ms: settings.auto_consume_interval_ms.get(),
            consume_batch_limit: settings.consume_batch_limit.get(),
            max_event_queue_len: settings.max_event_queue_len.get(),
        }
    }
}

pub fn default_cacheable_methods() -> Vec<Method> {
    vec![Method::GET, Method::HEAD]
}

impl CacheConfig {
    /// Store and tag tracking both on, everything else default.
    pub fn enabled() -> Self {
        Self {
            store: true,
            tags: true,
            ..Self::default()
        }
    }

    pub fn with_rules(mut self, rules: FreshnessRules) -> Self {
        self.rules = rules;
        self
    }

    /// Whether lookups may be served from the store at all.
    pub fn serves_from_store(&self) -> bool {
        self.store && self.tags
    }

    pub fn is_cacheable_method(&self, method: &Method) -> bool {
        self.cacheable_methods.contains(method)
    }

    /// Returns the memory entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn auto_consume_interval(&self) -> Duration {
        Duration::from_millis(self.auto_consume_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(!config.store);
        assert!(!config.tags);
        assert!(config.rules.is_empty());
        assert_eq!(config.body_limit_bytes, 1_048_576);
        assert_eq!(config.memory_entry_limit, 1024);
        assert_eq!(config.cacheable_methods, vec![Method::GET, Method::HEAD]);
        assert_eq!(config.auto_consume_interval_ms, 5000);
        assert_eq!(config.consume_batch_limit, 100);
        assert_eq!(config.max_event_queue_len, 10_000);
    }

    #[test]
    fn serving_requires_store_and_tags() {
        assert!(CacheConfig::enabled().serves_from_store());
        assert!(
            !CacheConfig {
                tags: false,
                ..CacheConfig::enabled()
            }
            .serves_from_store()
        );
        assert!(
            !CacheConfig {
                store: false,
                ..CacheConfig::enabled()
            }
            .serves_from_store()
        );
    }

    #[test]
    fn only_configured_methods_are_cacheable() {
        let config = CacheConfig::default();
        assert!(config.is_cacheable_method(&Method::HEAD));
        assert!(!config.is_cacheable_method(&Method::POST));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_entry_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_entry_limit_non_zero().get(), 1);
    }
}
