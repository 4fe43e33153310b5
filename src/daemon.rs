//! Gradle daemon shutdown
//!
//! Daemons hold locks and keep writing to Gradle User Home, so they are
//! stopped before anything is cleaned up or saved.

use crate::build_results::BuildResults;
use crate::gradle::{launcher, BuildToolRunner};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::path::Path;
use tracing::{info, warn};

/// Stops the processes started by the job's builds
#[async_trait]
pub trait ProcessController: Send + Sync {
    async fn stop_all(&self, build_results: &BuildResults);
}

/// Runs `gradle --stop` once per Gradle installation used by the job
pub struct GradleDaemonController<'a> {
    runner: &'a dyn BuildToolRunner,
}

impl<'a> GradleDaemonController<'a> {
    pub fn new(runner: &'a dyn BuildToolRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ProcessController for GradleDaemonController<'_> {
    async fn stop_all(&self, build_results: &BuildResults) {
        let homes = build_results.unique_gradle_homes();
        if homes.is_empty() {
            return;
        }
        info!("Stopping all Gradle daemons before saving Gradle User Home state");

        let cwd = std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir());
        let args = vec!["--stop".to_string()];
        let stops = homes.iter().map(|home| {
            let executable = launcher(home);
            let (args, cwd) = (&args, cwd.as_path());
            async move {
                if !executable.exists() {
                    warn!(
                        "Gradle executable not found at {}. Could not stop Gradle daemons.",
                        executable.display()
                    );
                    return;
                }
                info!("Stopping Gradle daemons for {}", home.display());
                stop_daemons(self.runner, &executable, args, cwd).await;
            }
        });
        join_all(stops).await;
    }
}

async fn stop_daemons(
    runner: &dyn BuildToolRunner,
    executable: &Path,
    args: &[String],
    cwd: &Path,
) {
    // The exit code of `--stop` carries no useful signal
    if let Err(e) = runner.run(executable, args, cwd).await {
        warn!("Failed to stop Gradle daemons with {}: {}", executable.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_results::testing::result;
    use crate::cache::cleaner::testing::RecordingRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stops_each_installed_home_once() {
        let temp = TempDir::new().unwrap();
        let installed = temp.path().join("gradle-8.12");
        std::fs::create_dir_all(installed.join("bin")).unwrap();
        std::fs::write(launcher(&installed), "").unwrap();
        let missing = temp.path().join("gradle-7.6");

        let results = BuildResults::new(vec![
            result("8.12", &installed.to_string_lossy(), false),
            result("8.12", &installed.to_string_lossy(), true),
            result("7.6", &missing.to_string_lossy(), false),
        ]);
        let runner = RecordingRunner {
            exit_code: 1,
            ..RecordingRunner::default()
        };

        GradleDaemonController::new(&runner).stop_all(&results).await;

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, launcher(&installed));
        assert_eq!(calls[0].1, vec!["--stop".to_string()]);
    }

    #[tokio::test]
    async fn no_builds_means_nothing_to_stop() {
        let runner = RecordingRunner::default();
        GradleDaemonController::new(&runner)
            .stop_all(&BuildResults::default())
            .await;
        assert!(runner.calls.lock().unwrap().is_empty());
    }
}
