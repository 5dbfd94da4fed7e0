//! Invalidation consumer.
//!
//! Drains events from the queue, merges them into a plan and purges the
//! planned tags from the store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::events::InvalidationQueue;
use super::metrics::{METRIC_CONSUME_MS, METRIC_INVALIDATED_TOTAL, METRIC_STORE_FAILURE_TOTAL};
use super::planner::InvalidationPlan;
use super::store::CacheStore;

/// What one consumption pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumeReport {
    pub events: usize,
    pub tags: usize,
    /// Entries removed from the store.
    pub removed: usize,
    /// Tags whose purge failed; their entries may still be served until
    /// they expire.
    pub failed_tags: Vec<String>,
}

impl ConsumeReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

pub struct CacheInvalidator {
    store: Arc<dyn CacheStore>,
    queue: Arc<InvalidationQueue>,
    batch_limit: usize,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn CacheStore>, queue: Arc<InvalidationQueue>, batch_limit: usize) -> Self {
        Self {
            store,
            queue,
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<InvalidationQueue> {
        &self.queue
    }

    /// Consume up to one batch of pending events.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> ConsumeReport {
        let consume_started_at = Instant::now();
        let events = self.queue.drain(self.batch_limit);
        if events.is_empty() {
            return ConsumeReport::default();
        }

        let event_ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count = event_ids.len(),
            event_ids = ?event_ids,
            plan = %plan,
            "Invalidation consumption starting"
        );

        let mut report = ConsumeReport {
            events: plan.event_count,
            tags: plan.tags.len(),
            ..ConsumeReport::default()
        };

        for tag in &plan.tags {
            match self.store.invalidate_by_tag(tag).await {
                Ok(removed) => report.removed += removed,
                Err(err) => {
                    counter!(METRIC_STORE_FAILURE_TOTAL, "op" => "invalidate").increment(1);
                    warn!(cache = "page", tag = %tag, error = %err, "Tag invalidation failed");
                    report.failed_tags.push(tag.clone());
                }
            }
        }

        counter!(METRIC_INVALIDATED_TOTAL).increment(report.removed as u64);
        info!(
            event_count = report.events,
            tags = report.tags,
            removed = report.removed,
            failed = report.failed_tags.len(),
            "Invalidation consumption complete"
        );
        histogram!(METRIC_CONSUME_MS).record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }

    /// Consume batches until the queue is empty.
    pub async fn consume_all(&self) -> ConsumeReport {
        let mut total = ConsumeReport::default();
        loop {
            let report = self.consume().await;
            if report.is_empty() {
                return total;
            }
            total.events += report.events;
            total.tags += report.tags;
            total.removed += report.removed;
            total.failed_tags.extend(report.failed_tags);
        }
    }

    /// Consume on a fixed interval until the returned handle is aborted.
    pub fn spawn_auto_consume(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip the first immediate tick
            loop {
                ticker.tick().await;
                self.consume().await;
            }
        })
    }
}
