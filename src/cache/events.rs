//! Invalidation events.
//!
//! Write paths publish events describing what changed; the invalidator
//! turns them into tag purges against the store.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::lock::mutex_lock;
use super::metrics::{METRIC_EVENT_DROPPED_TOTAL, METRIC_EVENT_QUEUE_LEN};
use super::tags::entity_tag;

const SOURCE: &str = "cache::events";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: InvalidationKind,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(kind: InvalidationKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationKind {
    /// An entity was created or edited.
    EntityUpdated { entity_type: String, entity_id: i64 },
    /// An entity was removed.
    EntityDeleted { entity_type: String, entity_id: i64 },
    /// Explicit tags to purge.
    TagsPurged { tags: Vec<String> },
}

impl InvalidationKind {
    pub fn updated(entity_type: impl Into<String>, entity_id: i64) -> Self {
        Self::EntityUpdated {
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    pub fn deleted(entity_type: impl Into<String>, entity_id: i64) -> Self {
        Self::EntityDeleted {
            entity_type: entity_type.into(),
            entity_id,
        }
    }

    /// Tags whose entries this event makes stale.
    pub fn tags(&self) -> Vec<String> {
        match self {
            Self::EntityUpdated {
                entity_type,
                entity_id,
            }
            | Self::EntityDeleted {
                entity_type,
                entity_id,
            } => vec![entity_tag(entity_type, *entity_id)],
            Self::TagsPurged { tags } => tags.clone(),
        }
    }
}

/// Bounded FIFO of pending invalidation events.
///
/// When full, the oldest event is dropped to make room.
pub struct InvalidationQueue {
    queue: Mutex<VecDeque<InvalidationEvent>>,
    epoch_counter: AtomicU64,
    capacity: usize,
}

impl InvalidationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            capacity: capacity.max(1),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: InvalidationKind) -> Uuid {
        let event = InvalidationEvent::new(kind, self.next_epoch());
        let event_id = event.id;

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Invalidation event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        if queue.len() >= self.capacity
            && let Some(dropped) = queue.pop_front()
        {
            counter!(METRIC_EVENT_DROPPED_TOTAL).increment(1);
            warn!(
                event_id = %dropped.id,
                event_epoch = dropped.epoch,
                capacity = self.capacity,
                "Invalidation queue full, dropped oldest event"
            );
        }
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);

        event_id
    }

    /// Drain up to `limit` events in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<InvalidationEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let events = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        events
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        mutex_lock(&self.queue, SOURCE, "clear").clear();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(0.0);
    }
}
