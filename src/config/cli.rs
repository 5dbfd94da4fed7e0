use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pagecache binary.
#[derive(Debug, Parser, Default)]
#[command(
    name = "pagecache",
    version,
    about = "Validate page cache configuration and inspect freshness rules"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PAGECACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load and validate the configuration.
    Check,
    /// Show which freshness rule applies to a request path.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    /// Request path, e.g. `/news/today`.
    #[arg(value_name = "PATH")]
    pub path: String,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Toggle serving and retaining response bodies.
    #[arg(
        long = "cache-store",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_store: Option<bool>,

    /// Toggle entity tag tracking.
    #[arg(
        long = "cache-tags",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_tags: Option<bool>,

    /// Override the largest response body kept in the cache.
    #[arg(long = "cache-body-limit-bytes", value_name = "BYTES", global = true)]
    pub cache_body_limit_bytes: Option<u64>,

    /// Override the in-memory store capacity.
    #[arg(long = "cache-memory-entry-limit", value_name = "COUNT", global = true)]
    pub cache_memory_entry_limit: Option<u64>,
}
