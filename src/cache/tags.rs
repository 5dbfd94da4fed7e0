//! Per-request entity tag collection.
//!
//! Each request that may be cached gets its own [`TagCollector`]. The
//! middleware places it in the request extensions and also scopes it as
//! the task-local "current" collector, so rendering code can call
//! [`record`] without threading the collector through every signature.
//!
//! Task-locals do not follow `tokio::spawn`; work moved onto another task
//! should take the collector from `Extension<Arc<TagCollector>>` instead.

use std::future::Future;
use std::sync::{Arc, Mutex};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::tags";

/// Ordered tags gathered while one response was produced.
pub type TagSet = Vec<String>;

tokio::task_local! {
    static CURRENT: Arc<TagCollector>;
}

/// Format an entity reference as a cache tag (`"node:42"`).
pub fn entity_tag(entity_type: &str, entity_id: i64) -> String {
    format!("{entity_type}:{entity_id}")
}

#[derive(Debug, Default)]
pub struct TagCollector {
    tags: Mutex<TagSet>,
}

impl TagCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity_type: &str, entity_id: i64) {
        self.record_tag(entity_tag(entity_type, entity_id));
    }

    pub fn record_tag(&self, tag: impl Into<String>) {
        mutex_lock(&self.tags, SOURCE, "record").push(tag.into());
    }

    /// Take everything recorded so far, leaving the collector empty.
    pub fn drain(&self) -> TagSet {
        std::mem::take(&mut *mutex_lock(&self.tags, SOURCE, "drain"))
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.tags, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Record an entity on the current request's collector.
///
/// Outside a [`scope`] this is a no-op.
pub fn record(entity_type: &str, entity_id: i64) {
    let _ = CURRENT.try_with(|collector| collector.record(entity_type, entity_id));
}

/// The collector scoped to the current task, if any.
pub fn current() -> Option<Arc<TagCollector>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Run `f` with `collector` as the current task's collector.
pub async fn scope<F>(collector: Arc<TagCollector>, f: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(collector, f).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_tags_in_insertion_order() {
        let collector = TagCollector::new();
        collector.record("node", 1);
        collector.record("node", 2);

        assert_eq!(collector.drain(), vec!["node:1", "node:2"]);
        assert!(collector.drain().is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let collector = TagCollector::new();
        collector.record("node", 7);
        collector.record("node", 7);
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn negative_ids_are_formatted_as_integers() {
        assert_eq!(entity_tag("term", -3), "term:-3");
    }

    #[tokio::test]
    async fn record_without_scope_is_no_op() {
        record("node", 1);
        assert!(current().is_none());
    }

    #[tokio::test]
    async fn scope_captures_records_from_nested_code() {
        let collector = Arc::new(TagCollector::new());

        scope(Arc::clone(&collector), async {
            record("node", 42);
            render_teaser().await;
        })
        .await;

        assert_eq!(collector.drain(), vec!["node:42", "user:9"]);
    }

    #[tokio::test]
    async fn concurrent_scopes_do_not_share_tags() {
        let first = Arc::new(TagCollector::new());
        let second = Arc::new(TagCollector::new());

        let a = tokio::spawn(scope(Arc::clone(&first), async {
            record("node", 1);
            tokio::task::yield_now().await;
            record("node", 2);
        }));
        let b = tokio::spawn(scope(Arc::clone(&second), async {
            record("media", 5);
            tokio::task::yield_now().await;
        }));
        a.await.expect("first task");
        b.await.expect("second task");

        assert_eq!(first.drain(), vec!["node:1", "node:2"]);
        assert_eq!(second.drain(), vec!["media:5"]);
    }

    async fn render_teaser() {
        if let Some(collector) = current() {
            collector.record("user", 9);
        }
    }
}
