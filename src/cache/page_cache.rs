//! Wiring for a complete page cache.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::config::CacheConfig;
use super::consumer::CacheInvalidator;
use super::engine::CacheDecisionEngine;
use super::events::InvalidationQueue;
use super::hooks::PresentationHooks;
use super::middleware::CacheState;
use super::store::{CacheStore, MemoryCacheStore};
use super::trigger::InvalidationTrigger;

/// Store, decision engine, invalidation pipeline and presentation hooks
/// built from one [`CacheConfig`].
///
/// ```ignore
/// let cache = PageCache::in_memory(config);
/// let app = Router::new()
///     .route("/articles/{id}", get(show_article))
///     .layer(from_fn_with_state(cache.state(), page_cache_layer));
/// ```
pub struct PageCache {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    engine: Arc<CacheDecisionEngine>,
    invalidator: Arc<CacheInvalidator>,
    trigger: Arc<InvalidationTrigger>,
    hooks: Arc<PresentationHooks>,
}

impl PageCache {
    pub fn in_memory(config: CacheConfig) -> Self {
        let store = Arc::new(MemoryCacheStore::new(&config));
        Self::with_store(config, store)
    }

    pub fn with_store(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let engine = Arc::new(CacheDecisionEngine::new(config.clone(), Arc::clone(&store)));
        let queue = Arc::new(InvalidationQueue::new(config.max_event_queue_len));
        let invalidator = Arc::new(CacheInvalidator::new(
            Arc::clone(&store),
            queue,
            config.consume_batch_limit,
        ));
        let trigger = Arc::new(InvalidationTrigger::new(
            config.tags,
            Arc::clone(&invalidator),
        ));

        Self {
            config,
            store,
            engine,
            invalidator,
            trigger,
            hooks: Arc::new(PresentationHooks::with_tag_recording()),
        }
    }

    /// Leave invalidation to [`spawn_auto_consume`](Self::spawn_auto_consume).
    pub fn with_deferred_invalidation(mut self) -> Self {
        self.trigger = Arc::new(
            InvalidationTrigger::new(self.config.tags, Arc::clone(&self.invalidator)).deferred(),
        );
        self
    }

    pub fn with_hooks(mut self, hooks: PresentationHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Middleware state for [`page_cache_layer`](super::page_cache_layer).
    pub fn state(&self) -> CacheState {
        CacheState::new(Arc::clone(&self.engine))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<CacheDecisionEngine> {
        &self.engine
    }

    pub fn invalidator(&self) -> &Arc<CacheInvalidator> {
        &self.invalidator
    }

    pub fn trigger(&self) -> &Arc<InvalidationTrigger> {
        &self.trigger
    }

    pub fn hooks(&self) -> &Arc<PresentationHooks> {
        &self.hooks
    }

    /// Start the background invalidation loop on the current runtime.
    pub fn spawn_auto_consume(&self) -> JoinHandle<()> {
        Arc::clone(&self.invalidator).spawn_auto_consume(self.config.auto_consume_interval())
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
