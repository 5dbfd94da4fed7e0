//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
};

use axum::http::Method;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{
    Directive, FreshnessRules, MalformedFreshnessRule,
    config::{
        DEFAULT_AUTO_CONSUME_INTERVAL_MS, DEFAULT_BODY_LIMIT_BYTES, DEFAULT_CONSUME_BATCH_LIMIT,
        DEFAULT_MAX_EVENT_QUEUE_LEN, DEFAULT_MEMORY_ENTRY_LIMIT,
    },
};

mod cli;

pub use cli::{CliArgs, Command, Overrides, ResolveArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pagecache";
const ENV_PREFIX: &str = "PAGECACHE";

/// Methods a cache rule may name.
const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::TRACE,
    Method::CONNECT,
];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub store: bool,
    pub tags: bool,
    /// Compiled `[[cache.expiries]]`, in file order.
    pub expiries: FreshnessRules,
    pub body_limit_bytes: NonZeroUsize,
    pub memory_entry_limit: NonZeroUsize,
    pub cacheable_methods: Vec<Method>,
    pub auto_consume_interval_ms: NonZeroU64,
    pub consume_batch_limit: NonZeroUsize,
    pub max_event_queue_len: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    MalformedFreshnessRule(#[from] MalformedFreshnessRule),
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(store) = overrides.cache_store {
            self.cache.store = Some(store);
        }
        if let Some(tags) = overrides.cache_tags {
            self.cache.tags = Some(tags);
        }
        if let Some(bytes) = overrides.cache_body_limit_bytes {
            self.cache.body_limit_bytes = Some(bytes);
        }
        if let Some(limit) = overrides.cache_memory_entry_limit {
            self.cache.memory_entry_limit = Some(limit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let expiries = FreshnessRules::compile(cache.expiries.into_iter().map(|rule| {
        (
            rule.pattern,
            Directive::new(rule.shared_max_age, rule.max_age),
        )
    }))?;

    let cacheable_methods = match cache.cacheable_methods {
        Some(methods) => parse_methods(&methods)?,
        None => crate::cache::config::default_cacheable_methods(),
    };

    Ok(CacheSettings {
        store: cache.store.unwrap_or(false),
        tags: cache.tags.unwrap_or(false),
        expiries,
        body_limit_bytes: non_zero_usize(
            cache
                .body_limit_bytes
                .unwrap_or(DEFAULT_BODY_LIMIT_BYTES as u64),
            "cache.body_limit_bytes",
        )?,
        memory_entry_limit: non_zero_usize(
            cache
                .memory_entry_limit
                .unwrap_or(DEFAULT_MEMORY_ENTRY_LIMIT as u64),
            "cache.memory_entry_limit",
        )?,
        cacheable_methods,
        auto_consume_interval_ms: NonZeroU64::new(
            cache
                .auto_consume_interval_ms
                .unwrap_or(DEFAULT_AUTO_CONSUME_INTERVAL_MS),
        )
        .ok_or_else(|| {
            LoadError::invalid("cache.auto_consume_interval_ms", "must be greater than zero")
        })?,
        consume_batch_limit: non_zero_usize(
            cache
                .consume_batch_limit
                .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT as u64),
            "cache.consume_batch_limit",
        )?,
        max_event_queue_len: non_zero_usize(
            cache
                .max_event_queue_len
                .unwrap_or(DEFAULT_MAX_EVENT_QUEUE_LEN as u64),
            "cache.max_event_queue_len",
        )?,
    })
}

fn parse_methods(methods: &[String]) -> Result<Vec<Method>, LoadError> {
    if methods.is_empty() {
        return Err(LoadError::invalid(
            "cache.cacheable_methods",
            "must list at least one method",
        ));
    }

    let mut parsed = Vec::with_capacity(methods.len());
    for raw in methods {
        let name = raw.trim().to_ascii_uppercase();
        let method = KNOWN_METHODS
            .iter()
            .find(|method| method.as_str() == name)
            .cloned()
            .ok_or_else(|| {
                LoadError::invalid("cache.cacheable_methods", format!("unknown method `{raw}`"))
            })?;
        if !parsed.contains(&method) {
            parsed.push(method);
        }
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    store: Option<bool>,
    tags: Option<bool>,
    expiries: Vec<RawExpiry>,
    body_limit_bytes: Option<u64>,
    memory_entry_limit: Option<u64>,
    cacheable_methods: Option<Vec<String>>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<u64>,
    max_event_queue_len: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawExpiry {
    pattern: String,
    #[serde(default, rename = "s-maxage", alias = "s_maxage")]
    shared_max_age: Option<u64>,
    #[serde(default, rename = "maxage", alias = "max_age")]
    max_age: Option<u64>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_usize: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value_usize).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
