//! Cleanup command - run the cache cleaner outside the save phase

use crate::build_results::BuildResults;
use crate::cache::CacheCleaner;
use crate::cli::args::CleanupArgs;
use crate::cli::commands::job::Job;
use crate::config::{Config, ConfigManager};
use crate::error::{CacheError, CacheResult};
use crate::gradle::{CommandRunner, DistributionProvisioner};
use crate::state::JobState;
use crate::ui::{TaskSpinner, UiContext};
use std::path::Path;

/// Execute the cleanup command
pub async fn execute(args: CleanupArgs, config: &Config, state_path: &Path) -> CacheResult<()> {
    let state = JobState::load(state_path).await?;
    let timestamp = args.timestamp.or(state.cleanup_timestamp).ok_or_else(|| {
        CacheError::CleanupFailed("no cleanup start time recorded; pass --timestamp".to_string())
    })?;

    let job = Job::resolve(config, &state)?;
    let build_results = BuildResults::load(&ConfigManager::build_results_dir()).await?;
    let provisioner = DistributionProvisioner::from_config(&config.cleanup, job.tool_dir());
    let cleaner = CacheCleaner::new(&job.gradle_user_home, &job.tmp_dir);

    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Cleaning up Gradle User Home...");
    match cleaner
        .force_cleanup(timestamp, &build_results, &provisioner, &CommandRunner)
        .await
    {
        Ok(()) => {
            spinner.stop("Cleanup complete");
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Cleanup failed");
            Err(e)
        }
    }
}
