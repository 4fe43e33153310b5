//! Cache cleanup
//!
//! Gradle only removes unused cache entries periodically. Before saving we
//! force a cleanup of everything not touched since the job started, by
//! running a no-op build against Gradle User Home with an init script that
//! sets the cleanup retention to the job start time.

use crate::build_results::BuildResults;
use crate::error::{CacheError, CacheResult};
use crate::gradle::{launcher, version_is_at_least, BuildToolRunner, GradleProvisioner};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Oldest Gradle able to force a cleanup from an init script
pub const CLEANUP_MIN_GRADLE: &str = "8.11";

const CLEANUP_PROJECT: &str = "dummy-cleanup-project";

pub struct CacheCleaner {
    gradle_user_home: PathBuf,
    tmp_dir: PathBuf,
}

impl CacheCleaner {
    pub fn new(gradle_user_home: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            gradle_user_home: gradle_user_home.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Timestamp (ms since epoch) marking the start of the job's builds
    pub fn prepare(&self) -> i64 {
        let timestamp = Utc::now().timestamp_millis();
        debug!("Recorded cache cleanup start time {}", timestamp);
        timestamp
    }

    /// Remove everything in Gradle User Home not used since `cleanup_time`
    pub async fn force_cleanup(
        &self,
        cleanup_time: i64,
        build_results: &BuildResults,
        provisioner: &dyn GradleProvisioner,
        runner: &dyn BuildToolRunner,
    ) -> CacheResult<()> {
        let executable = cleanup_executable(build_results, provisioner).await?;
        self.force_cleanup_files_older_than(cleanup_time, &executable, runner)
            .await
    }

    /// Run the no-op cleanup build with `executable`
    pub async fn force_cleanup_files_older_than(
        &self,
        cleanup_time: i64,
        executable: &Path,
        runner: &dyn BuildToolRunner,
    ) -> CacheResult<()> {
        let project_dir = self.tmp_dir.join(CLEANUP_PROJECT);
        write_cleanup_project(&project_dir, cleanup_time)?;

        let args: Vec<String> = vec![
            "-g".to_string(),
            self.gradle_user_home.to_string_lossy().to_string(),
            "-I".to_string(),
            "init.gradle".to_string(),
            "--info".to_string(),
            "--no-daemon".to_string(),
            "--no-scan".to_string(),
            "--build-cache".to_string(),
            "-DGITHUB_DEPENDENCY_GRAPH_ENABLED=false".to_string(),
            "noop".to_string(),
        ];

        info!(
            "Forcing cleanup of Gradle User Home entries unused since {}",
            cleanup_time
        );
        let code = runner.run(executable, &args, &project_dir).await?;
        if code != 0 {
            return Err(CacheError::CommandExecution {
                command: format!("{} {}", executable.display(), args.join(" ")),
                code,
            });
        }
        Ok(())
    }
}

/// The newest Gradle used by the job when recent enough, else a provisioned one
async fn cleanup_executable(
    build_results: &BuildResults,
    provisioner: &dyn GradleProvisioner,
) -> CacheResult<PathBuf> {
    if let Some(newest) = build_results.highest_gradle_version() {
        let executable = launcher(&newest.gradle_home_dir);
        if version_is_at_least(&newest.gradle_version, CLEANUP_MIN_GRADLE) && executable.exists() {
            debug!(
                "Using Gradle {} from {} for cache cleanup",
                newest.gradle_version,
                executable.display()
            );
            return Ok(executable);
        }
    }
    provisioner.provision_at_least(CLEANUP_MIN_GRADLE).await
}

fn write_cleanup_project(project_dir: &Path, cleanup_time: i64) -> CacheResult<()> {
    std::fs::create_dir_all(project_dir)
        .map_err(|e| CacheError::io(format!("creating {}", project_dir.display()), e))?;

    let files = [
        (
            "settings.gradle",
            format!("rootProject.name = \"{}\"\n", CLEANUP_PROJECT),
        ),
        ("build.gradle", "task(\"noop\") {}\n".to_string()),
        ("init.gradle", init_script(cleanup_time)),
    ];
    for (name, content) in files {
        let path = project_dir.join(name);
        std::fs::write(&path, content)
            .map_err(|e| CacheError::io(format!("writing {}", path.display()), e))?;
    }
    Ok(())
}

fn init_script(cleanup_time: i64) -> String {
    format!(
        r#"beforeSettings {{ settings ->
    def cleanupTime = {}

    settings.caches {{
        cleanup = Cleanup.ALWAYS

        releasedWrappers.setRemoveUnusedEntriesOlderThan(cleanupTime)
        snapshotWrappers.setRemoveUnusedEntriesOlderThan(cleanupTime)
        downloadedResources.setRemoveUnusedEntriesOlderThan(cleanupTime)
        createdResources.setRemoveUnusedEntriesOlderThan(cleanupTime)
        buildCache.setRemoveUnusedEntriesOlderThan(cleanupTime)
    }}
}}
"#,
        cleanup_time
    )
}
