use std::process;

use pagecache::{
    cache::{CacheConfig, FreshnessRules},
    config::{self, Command, ResolveArgs},
    error::AppError,
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let cache = CacheConfig::from(&settings.cache);
    match cli_args.command.unwrap_or(Command::Check) {
        Command::Check => run_check(&cache),
        Command::Resolve(args) => run_resolve(&cache.rules, &args),
    }

    Ok(())
}

fn run_check(cache: &CacheConfig) {
    info!(
        store = cache.store,
        tags = cache.tags,
        rules = cache.rules.len(),
        body_limit_bytes = cache.body_limit_bytes,
        memory_entry_limit = cache.memory_entry_limit,
        "Configuration is valid"
    );

    for (index, rule) in cache.rules.iter().enumerate() {
        println!("{index}\t{}\t{}", rule.pattern(), rule.directive());
    }
}

fn run_resolve(rules: &FreshnessRules, args: &ResolveArgs) {
    match rules.find(&args.path) {
        Some((index, rule)) => println!("{index}\t{}\t{}", rule.pattern(), rule.directive()),
        None => println!("no rule matches {}", args.path),
    }
}
