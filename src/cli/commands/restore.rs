//! Restore command - setup phase of a job

use crate::cache::lifecycle::{self, RestoreOutcome};
use crate::cli::commands::job::Job;
use crate::config::Config;
use crate::error::CacheResult;
use crate::state::JobState;
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::Path;

/// Execute the restore command
pub async fn execute(config: &Config, state_path: &Path) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let mut state = JobState::load(state_path).await?;
    let mut listener = state.listener()?;
    let job = Job::resolve(config, &state)?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Restoring Gradle User Home...");

    let context = job.context(&config.cache);
    let outcome = match lifecycle::restore(&context, &mut state, &mut listener).await {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.stop_error("Failed to prepare Gradle User Home");
            return Err(e);
        }
    };

    match &outcome {
        RestoreOutcome::Restored { key } => spinner.stop(&format!("Restored {}", key)),
        RestoreOutcome::NotFound => spinner.stop("No cache entry found, starting empty"),
        RestoreOutcome::AlreadyAttempted => spinner.stop("Already restored by an earlier step"),
        RestoreOutcome::WriteOnly => spinner.stop("Cache is write-only, nothing restored"),
        RestoreOutcome::Disabled | RestoreOutcome::Unavailable | RestoreOutcome::ExistingHome => {
            spinner.stop_warn(&listener.cache_status_reason)
        }
    }

    if outcome == RestoreOutcome::Unavailable {
        ui::step_warn_hint(
            &ctx,
            "Cache store not available",
            "Set GRADLE_CACHE_STORE_DIR or [store] dir in the config",
        );
    }
    ui::key_value(&ctx, "Gradle User Home", &job.gradle_user_home.display().to_string());

    state.user_home = Some(job.user_home.clone());
    state.gradle_user_home = Some(job.gradle_user_home.clone());
    state.setup_completed = true;
    state.set_listener(&listener)?;
    state.save(state_path).await
}
