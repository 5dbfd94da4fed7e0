use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_BYPASS_TOTAL, METRIC_CONSUME_MS, METRIC_EVENT_DROPPED_TOTAL, METRIC_EVENT_QUEUE_LEN,
    METRIC_EVICT_TOTAL, METRIC_HIT_TOTAL, METRIC_INVALIDATED_TOTAL, METRIC_MISS_TOTAL,
    METRIC_STORE_FAILURE_TOTAL, METRIC_STORE_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register units and help text for the page cache metrics.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_HIT_TOTAL,
            Unit::Count,
            "Requests answered from the page cache."
        );
        describe_counter!(
            METRIC_MISS_TOTAL,
            Unit::Count,
            "Cacheable requests with no live entry."
        );
        describe_counter!(
            METRIC_BYPASS_TOTAL,
            Unit::Count,
            "Requests that skipped the cache because of an authenticated session."
        );
        describe_counter!(
            METRIC_STORE_TOTAL,
            Unit::Count,
            "Responses written to the cache store."
        );
        describe_counter!(
            METRIC_STORE_FAILURE_TOTAL,
            Unit::Count,
            "Cache store operations that failed, labelled by operation."
        );
        describe_counter!(
            METRIC_EVICT_TOTAL,
            Unit::Count,
            "Entries evicted from the in-memory store due to capacity."
        );
        describe_counter!(
            METRIC_INVALIDATED_TOTAL,
            Unit::Count,
            "Entries removed by tag invalidation."
        );
        describe_gauge!(
            METRIC_EVENT_QUEUE_LEN,
            Unit::Count,
            "Current number of pending invalidation events."
        );
        describe_counter!(
            METRIC_EVENT_DROPPED_TOTAL,
            Unit::Count,
            "Invalidation events dropped due to queue overflow."
        );
        describe_histogram!(
            METRIC_CONSUME_MS,
            Unit::Milliseconds,
            "Invalidation consumption latency in milliseconds."
        );
    });
}
