//! Metric names emitted by the page cache.

pub const METRIC_HIT_TOTAL: &str = "pagecache_hit_total";
pub const METRIC_MISS_TOTAL: &str = "pagecache_miss_total";
pub const METRIC_BYPASS_TOTAL: &str = "pagecache_bypass_total";
pub const METRIC_STORE_TOTAL: &str = "pagecache_store_total";
pub const METRIC_STORE_FAILURE_TOTAL: &str = "pagecache_store_failure_total";
pub const METRIC_EVICT_TOTAL: &str = "pagecache_evict_total";
pub const METRIC_INVALIDATED_TOTAL: &str = "pagecache_invalidated_total";
pub const METRIC_EVENT_QUEUE_LEN: &str = "pagecache_event_queue_len";
pub const METRIC_EVENT_DROPPED_TOTAL: &str = "pagecache_event_dropped_total";
pub const METRIC_CONSUME_MS: &str = "pagecache_consume_ms";
