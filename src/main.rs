//! gradle-cache - Gradle User Home caching for CI jobs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use gradle_cache::cli::{commands, Cli, Commands};
use gradle_cache::config::{Config, ConfigManager};
use gradle_cache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = cli.command {
        commands::completions(args);
        return Ok(());
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Logging is set up before the inputs are read so deprecations are shown;
    // the file alone decides the format.
    let file_config = config_manager.load().await?;
    init_logging(cli.verbose, &file_config);

    let (config, deprecations) = config_manager.load_with_env().await?;

    let state_path = cli.state.clone().unwrap_or_else(ConfigManager::default_state_path);
    debug!("Using job state {}", state_path.display());

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Restore => commands::restore(&config, &state_path).await,
        Commands::Save => commands::save(&config, &deprecations, &state_path).await,
        Commands::Key(args) => commands::key(args, &config),
        Commands::Report(args) => commands::report(args, &deprecations, &state_path).await,
        Commands::Cleanup(args) => commands::cleanup(args, &config, &state_path).await,
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; cache debugging forces debug
fn init_logging(verbose: u8, config: &Config) {
    let debug_enabled = config.cache.debug
        || std::env::var(gradle_cache::config::CACHE_DEBUG_VAR).is_ok_and(|v| !v.is_empty());

    let filter = match (verbose, debug_enabled) {
        (_, true) | (2.., _) => EnvFilter::new("gradle_cache=debug"),
        (1, _) => EnvFilter::new("gradle_cache=info"),
        _ => EnvFilter::new("gradle_cache=warn"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
