use std::io::Write;

use clap::Parser;
use pagecache::cache::{CacheConfig, Directive};
use pagecache::config::{self, CliArgs, LoadError};
use serial_test::serial;
use tempfile::NamedTempFile;

const SITE_CONFIG: &str = r#"
[logging]
level = "debug"

[cache]
store = true
tags = true
memory_entry_limit = 64

[[cache.expiries]]
pattern = "^/news/archive"
s-maxage = 86400

[[cache.expiries]]
pattern = "^/news"
s-maxage = 600
maxage = 60
"#;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn args(file: &NamedTempFile, extra: &[&str]) -> CliArgs {
    let path = file.path().to_str().expect("utf8 path");
    let mut argv = vec!["pagecache", "--config-file", path];
    argv.extend_from_slice(extra);
    CliArgs::parse_from(argv)
}

#[test]
#[serial]
fn file_settings_build_a_cache_config() {
    let file = config_file(SITE_CONFIG);
    let settings = config::load(&args(&file, &[])).expect("settings load");

    let cache = CacheConfig::from(&settings.cache);
    assert!(cache.serves_from_store());
    assert_eq!(cache.memory_entry_limit, 64);
    assert_eq!(cache.rules.len(), 2);
    assert_eq!(
        cache.rules.resolve("/news/archive/1999"),
        Some(&Directive::shared(86400))
    );
    assert_eq!(
        cache.rules.resolve("/news/today"),
        Some(&Directive::new(Some(600), Some(60)))
    );
}

#[test]
#[serial]
fn environment_overrides_file_and_cli_overrides_environment() {
    let file = config_file(SITE_CONFIG);

    // SAFETY: serialized with every other test touching the environment.
    unsafe {
        std::env::set_var("PAGECACHE__CACHE__STORE", "false");
        std::env::set_var("PAGECACHE__CACHE__MEMORY_ENTRY_LIMIT", "8");
    }

    let from_env = config::load(&args(&file, &[]));
    let from_cli = config::load(&args(&file, &["--cache-memory-entry-limit", "4"]));

    unsafe {
        std::env::remove_var("PAGECACHE__CACHE__STORE");
        std::env::remove_var("PAGECACHE__CACHE__MEMORY_ENTRY_LIMIT");
    }

    let from_env = from_env.expect("settings load");
    assert!(!from_env.cache.store);
    assert!(from_env.cache.tags);
    assert_eq!(from_env.cache.memory_entry_limit.get(), 8);

    let from_cli = from_cli.expect("settings load");
    assert_eq!(from_cli.cache.memory_entry_limit.get(), 4);
}

#[test]
#[serial]
fn malformed_pattern_fails_at_load_time() {
    let file = config_file(
        r#"
[[cache.expiries]]
pattern = "^/news/("
s-maxage = 600
"#,
    );

    let err = config::load(&args(&file, &[])).expect_err("pattern must not compile");
    match err {
        LoadError::MalformedFreshnessRule(rule) => assert_eq!(rule.pattern, "^/news/("),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn missing_explicit_config_file_is_an_error() {
    let args = CliArgs::parse_from(["pagecache", "--config-file", "/nonexistent/pagecache.toml"]);
    let err = config::load(&args).expect_err("file is required");
    assert!(matches!(err, LoadError::Build(_)));
}
