//! Invalidation trigger.
//!
//! Write paths call the trigger after a successful change; it publishes
//! the event and, unless deferred, consumes the queue before returning.

use std::sync::Arc;

use tracing::debug;

use super::consumer::{CacheInvalidator, ConsumeReport};
use super::events::InvalidationKind;

/// # Usage
///
/// ```ignore
/// // After an article was saved:
/// trigger.entity_updated("node", article.id).await;
/// ```
pub struct InvalidationTrigger {
    enabled: bool,
    consume_now: bool,
    invalidator: Arc<CacheInvalidator>,
}

impl InvalidationTrigger {
    /// A trigger that consumes immediately after publishing.
    ///
    /// With `enabled = false` (tag tracking off) events are not published.
    pub fn new(enabled: bool, invalidator: Arc<CacheInvalidator>) -> Self {
        Self {
            enabled,
            consume_now: true,
            invalidator,
        }
    }

    /// Leave consumption to the background loop instead.
    pub fn deferred(mut self) -> Self {
        self.consume_now = false;
        self
    }

    pub fn consumes_now(&self) -> bool {
        self.consume_now
    }

    pub fn invalidator(&self) -> &Arc<CacheInvalidator> {
        &self.invalidator
    }

    /// Publish `kind`; returns the consumption report when consumed inline.
    pub async fn trigger(&self, kind: InvalidationKind) -> Option<ConsumeReport> {
        if !self.enabled {
            debug!(event_kind = ?kind, "Invalidation skipped: tag tracking disabled");
            return None;
        }

        self.invalidator.queue().publish(kind);

        if self.consume_now {
            Some(self.invalidator.consume().await)
        } else {
            None
        }
    }

    pub async fn entity_updated(&self, entity_type: &str, entity_id: i64) -> Option<ConsumeReport> {
        self.trigger(InvalidationKind::updated(entity_type, entity_id))
            .await
    }

    pub async fn entity_deleted(&self, entity_type: &str, entity_id: i64) -> Option<ConsumeReport> {
        self.trigger(InvalidationKind::deleted(entity_type, entity_id))
            .await
    }

    pub async fn purge_tags<I, T>(&self, tags: I) -> Option<ConsumeReport>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        self.trigger(InvalidationKind::TagsPurged { tags }).await
    }
}
