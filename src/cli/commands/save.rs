//! Save command - completion phase of a job

use crate::build_results::BuildResults;
use crate::cache::lifecycle::{self, BuildTools, SaveOutcome};
use crate::cli::commands::job::Job;
use crate::config::{Config, ConfigManager, Deprecations};
use crate::daemon::GradleDaemonController;
use crate::error::CacheResult;
use crate::gradle::{CommandRunner, DistributionProvisioner};
use crate::state::JobState;
use crate::ui::{TaskSpinner, UiContext};
use std::path::Path;

/// Execute the save command
pub async fn execute(
    config: &Config,
    deprecations: &Deprecations,
    state_path: &Path,
) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let mut state = JobState::load(state_path).await?;
    let mut listener = state.listener()?;
    let job = Job::resolve(config, &state)?;
    let build_results = BuildResults::load(&ConfigManager::build_results_dir()).await?;

    let runner = CommandRunner;
    let provisioner = DistributionProvisioner::from_config(&config.cleanup, job.tool_dir());
    let daemons = GradleDaemonController::new(&runner);
    let tools = BuildTools {
        processes: &daemons,
        provisioner: &provisioner,
        runner: &runner,
    };

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Saving Gradle User Home...");

    let outcome = lifecycle::save(
        &job.context(&config.cache),
        &state,
        &mut listener,
        &build_results,
        &tools,
    )
    .await;

    match outcome {
        SaveOutcome::Saved { key } => spinner.stop(&format!("Saved {}", key)),
        SaveOutcome::Unchanged { key } => {
            spinner.stop(&format!("Entry {} unchanged, not saved", key))
        }
        SaveOutcome::Disabled => spinner.stop_warn("Cache is disabled, not saved"),
        SaveOutcome::NotRestored => {
            spinner.stop_warn("Restore did not run in this job, not saved")
        }
        SaveOutcome::ReadOnly => spinner.stop_warn("Cache is read-only, not saved"),
        SaveOutcome::Aborted { reason } => spinner.stop_error(&format!("Not saved: {}", reason)),
    }

    println!();
    print!("{}", deprecations.render());
    print!("{}", listener.generate_report());

    build_results.mark_processed().await?;
    state.set_listener(&listener)?;
    state.save(state_path).await
}
