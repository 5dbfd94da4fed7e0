//! Page cache.
//!
//! Stores rendered responses keyed by `(method, uri)` and indexes them by
//! the entity tags recorded while they were rendered:
//!
//! - **Request phase**: anonymous `GET`/`HEAD` requests are answered from
//!   the store when a live entry exists.
//! - **Response phase**: the first matching freshness rule stamps
//!   `s-maxage`/`max-age` unless the handler already set `s-maxage`.
//! - **Terminate phase**: cacheable responses are stored with their tags
//!   after the response has been handed back to the server.
//! - **Invalidation**: entity changes are published as events and purge
//!   every entry carrying the affected tags.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! store = true
//! tags = true
//!
//! [[cache.expiries]]
//! pattern = "^/news"
//! s-maxage = 600
//! ```

pub mod config;
mod consumer;
mod control;
mod engine;
mod entry;
mod error;
mod events;
mod freshness;
pub mod hooks;
mod lock;
mod metrics;
mod middleware;
mod page_cache;
mod planner;
mod registry;
mod request;
mod store;
pub mod tags;
mod trigger;

pub use self::config::CacheConfig;
pub use consumer::{CacheInvalidator, ConsumeReport};
pub use control::{CacheControl, cacheable_lifetime};
pub use engine::{CacheDecisionEngine, CompletedResponse, PersistOutcome, SkipReason};
pub use entry::{CacheEntry, CacheHit, EntryKey, HeaderValues, headers_from_map, headers_to_map};
pub use error::{MalformedFreshnessRule, StoreError};
pub use events::{Epoch, InvalidationEvent, InvalidationKind, InvalidationQueue};
pub use freshness::{Directive, FreshnessRule, FreshnessRules, resolve};
pub use hooks::{EntityPresented, PresentationHooks, PresentationListener, RecordTags};
pub use self::metrics::*;
pub use middleware::{CacheState, page_cache_layer};
pub use page_cache::PageCache;
pub use planner::InvalidationPlan;
pub use request::{CacheRequest, Session, full_uri};
pub use store::{CacheStore, MemoryCacheStore};
pub use tags::{TagCollector, TagSet, entity_tag};
pub use trigger::InvalidationTrigger;
