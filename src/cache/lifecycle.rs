//! Restore and save phases of a CI job
//!
//! `restore` runs in the setup step before any build, `save` in the
//! completion step after all builds. Both phases read and update the
//! persisted [`JobState`] so the decisions of the first can be honoured by
//! the second.

use crate::build_results::BuildResults;
use crate::cache::cleaner::CacheCleaner;
use crate::cache::home::{GradleUserHomeCache, HomeSave};
use crate::cache::key::KeyContext;
use crate::cache::report::{
    CacheListener, CLEANUP_DISABLED_DUE_TO_CONFIG_CACHE_HIT, CLEANUP_DISABLED_DUE_TO_FAILURE,
    DEFAULT_DISABLED_REASON, EXISTING_GRADLE_HOME,
};
use crate::cache::store::CacheStore;
use crate::config::CacheConfig;
use crate::daemon::ProcessController;
use crate::error::CacheResult;
use crate::gradle::{BuildToolRunner, GradleProvisioner};
use crate::runner::JobEnvironment;
use crate::state::JobState;
use std::path::Path;
use tracing::{info, warn};

/// Everything both phases need to know about the job
pub struct CacheContext<'a> {
    pub config: &'a CacheConfig,
    pub key_context: &'a KeyContext,
    pub store: &'a dyn CacheStore,
    pub environment: &'a JobEnvironment,
    pub user_home: &'a Path,
    pub gradle_user_home: &'a Path,
    /// Scratch directory for the cleanup project
    pub tmp_dir: &'a Path,
}

impl<'a> CacheContext<'a> {
    fn home_cache(&self) -> GradleUserHomeCache<'a> {
        GradleUserHomeCache::new(
            self.user_home,
            self.gradle_user_home,
            self.config,
            self.key_context,
            self.environment,
        )
    }

    fn caching_disabled(&self) -> bool {
        self.config.disabled || !self.store.is_available()
    }
}

/// Collaborators that run Gradle during the save phase
pub struct BuildTools<'a> {
    pub processes: &'a dyn ProcessController,
    pub provisioner: &'a dyn GradleProvisioner,
    pub runner: &'a dyn BuildToolRunner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// An earlier step of this job already ran restore
    AlreadyAttempted,
    Disabled,
    Unavailable,
    /// Gradle User Home already had content and overwriting was not allowed
    ExistingHome,
    WriteOnly,
    Restored { key: String },
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Disabled,
    /// Restore did not initialise caching this job
    NotRestored,
    ReadOnly,
    /// The restored entry already has the key we would save under
    Unchanged { key: String },
    Saved { key: String },
    Aborted { reason: String },
}

/// Restore Gradle User Home for the builds of this job
pub async fn restore(
    ctx: &CacheContext<'_>,
    state: &mut JobState,
    listener: &mut CacheListener,
) -> CacheResult<RestoreOutcome> {
    if state.restore_attempted {
        info!("Cache only restored on first action step.");
        return Ok(RestoreOutcome::AlreadyAttempted);
    }
    state.restore_attempted = true;

    let home = ctx.home_cache();

    if ctx.caching_disabled() {
        info!("Cache is disabled: will not restore state from previous builds.");
        home.init()?;
        if ctx.config.disabled {
            listener.set_disabled(DEFAULT_DISABLED_REASON);
            return Ok(RestoreOutcome::Disabled);
        }
        listener.set_unavailable();
        return Ok(RestoreOutcome::Unavailable);
    }

    if home.cache_output_exists() {
        if !ctx.config.overwrite_existing {
            info!("Gradle User Home already exists: will not restore from cache.");
            home.init()?;
            listener.set_disabled(EXISTING_GRADLE_HOME);
            return Ok(RestoreOutcome::ExistingHome);
        }
        info!("Gradle User Home already exists: will overwrite with cached contents.");
    }

    home.init()?;
    state.cache_restored = true;

    if ctx.config.is_cleanup_enabled() {
        info!("Preparing cache for cleanup.");
        let cleaner = CacheCleaner::new(ctx.gradle_user_home, ctx.tmp_dir);
        state.cleanup_timestamp = Some(cleaner.prepare());
    }

    if ctx.config.write_only {
        info!("Cache is write-only: will not restore from cache.");
        listener.set_write_only();
        return Ok(RestoreOutcome::WriteOnly);
    }

    match home.restore(ctx.store, listener).await {
        Some(key) => {
            state.restored_cache_key = Some(key.clone());
            Ok(RestoreOutcome::Restored { key })
        }
        None => Ok(RestoreOutcome::NotFound),
    }
}

/// Save Gradle User Home once all builds of the job are done
pub async fn save(
    ctx: &CacheContext<'_>,
    state: &JobState,
    listener: &mut CacheListener,
    build_results: &BuildResults,
    tools: &BuildTools<'_>,
) -> SaveOutcome {
    if ctx.caching_disabled() {
        info!("Cache is disabled: will not save state for later builds.");
        return SaveOutcome::Disabled;
    }

    if !state.cache_restored {
        info!("Cache will not be saved: not restored in first action step.");
        return SaveOutcome::NotRestored;
    }

    if ctx.config.is_read_only() {
        info!("Cache is read-only: will not save state for use in subsequent builds.");
        listener.set_read_only();
        return SaveOutcome::ReadOnly;
    }

    // Daemons must release their locks before anything is archived
    tools.processes.stop_all(build_results).await;

    if ctx.config.is_cleanup_enabled() {
        if build_results.any_config_cache_hit() {
            info!("Not performing cache-cleanup due to config-cache reuse");
            listener.set_cleanup_disabled(CLEANUP_DISABLED_DUE_TO_CONFIG_CACHE_HIT);
        } else if ctx.config.should_perform_cleanup(build_results.any_failed()) {
            listener.set_cleanup_enabled();
            cleanup(ctx, state, build_results, tools).await;
        } else {
            info!("Not performing cache-cleanup due to build failure");
            listener.set_cleanup_disabled(CLEANUP_DISABLED_DUE_TO_FAILURE);
        }
    }

    let home = ctx.home_cache();
    match home
        .save(
            ctx.store,
            listener,
            state.restored_cache_key.as_deref(),
            build_results.results(),
        )
        .await
    {
        HomeSave::KeyUnchanged(key) => SaveOutcome::Unchanged { key },
        HomeSave::Attempted(key) => SaveOutcome::Saved { key },
        HomeSave::Aborted(reason) => SaveOutcome::Aborted { reason },
    }
}

async fn cleanup(
    ctx: &CacheContext<'_>,
    state: &JobState,
    build_results: &BuildResults,
    tools: &BuildTools<'_>,
) {
    let Some(timestamp) = state.cleanup_timestamp else {
        warn!("Cache cleanup skipped: no start time was recorded in the first action step");
        return;
    };

    let cleaner = CacheCleaner::new(ctx.gradle_user_home, ctx.tmp_dir);
    if let Err(e) = cleaner
        .force_cleanup(timestamp, build_results, tools.provisioner, tools.runner)
        .await
    {
        warn!("Cache cleanup failed. Will continue. {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_results::testing::result;
    use crate::cache::cleaner::testing::{FixedProvisioner, RecordingRunner};
    use crate::cache::home::HOME_CACHE_DESCRIPTION;
    use crate::cache::key::generate_cache_key;
    use crate::cache::report::{
        CLEANUP_DISABLED_READONLY, DEFAULT_CLEANUP_DISABLED_REASON, DEFAULT_CLEANUP_ENABLED_REASON,
    };
    use crate::cache::store::testing::MemoryStore;
    use crate::config::schema::CleanupMode;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records how many saves the store had seen when daemons were stopped
    struct StopRecorder<'a> {
        store: &'a MemoryStore,
        saves_at_stop: Mutex<Vec<usize>>,
    }

    impl<'a> StopRecorder<'a> {
        fn new(store: &'a MemoryStore) -> Self {
            Self {
                store,
                saves_at_stop: Mutex::new(Vec::new()),
            }
        }

        fn stops(&self) -> Vec<usize> {
            self.saves_at_stop.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessController for StopRecorder<'_> {
        async fn stop_all(&self, _build_results: &BuildResults) {
            self.saves_at_stop.lock().unwrap().push(self.store.save_calls());
        }
    }

    struct Job {
        temp: TempDir,
        config: CacheConfig,
        key_context: KeyContext,
        environment: JobEnvironment,
    }

    impl Job {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::create_dir_all(temp.path().join("user")).unwrap();
            std::fs::create_dir_all(temp.path().join("tmp")).unwrap();
            Self {
                temp,
                config: CacheConfig::default(),
                key_context: KeyContext {
                    environment: "Linux-X64".to_string(),
                    job: "build".to_string(),
                    workflow: "CI".to_string(),
                    execution: "abc123".to_string(),
                    ..KeyContext::default()
                },
                environment: JobEnvironment::default(),
            }
        }

        fn user_home(&self) -> PathBuf {
            self.temp.path().join("user")
        }

        fn gradle_user_home(&self) -> PathBuf {
            self.temp.path().join("user/.gradle")
        }

        fn tmp_dir(&self) -> PathBuf {
            self.temp.path().join("tmp")
        }

        fn key(&self) -> String {
            generate_cache_key("home", &self.config, &self.key_context).key
        }

        fn populate_home(&self) {
            std::fs::create_dir_all(self.gradle_user_home().join("caches/modules-2")).unwrap();
        }
    }

    /// Build a context borrowing from the job; paths must outlive it
    macro_rules! context {
        ($job:expr, $store:expr, $user:ident, $home:ident, $tmp:ident) => {
            CacheContext {
                config: &$job.config,
                key_context: &$job.key_context,
                store: $store,
                environment: &$job.environment,
                user_home: &$user,
                gradle_user_home: &$home,
                tmp_dir: &$tmp,
            }
        };
    }

    fn paths(job: &Job) -> (PathBuf, PathBuf, PathBuf) {
        (job.user_home(), job.gradle_user_home(), job.tmp_dir())
    }

    #[tokio::test]
    async fn restore_runs_once_per_job() {
        let job = Job::new();
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        let first = restore(&ctx, &mut state, &mut listener).await.unwrap();
        let second = restore(&ctx, &mut state, &mut listener).await.unwrap();

        assert_eq!(first, RestoreOutcome::NotFound);
        assert_eq!(second, RestoreOutcome::AlreadyAttempted);
        assert_eq!(store.restore_calls(), 1);
        assert!(state.cache_restored);
        assert!(home.join(".setup-gradle").is_dir());
    }

    #[tokio::test]
    async fn existing_home_is_not_overwritten() {
        let job = Job::new();
        job.populate_home();
        let store = MemoryStore::default().with_entry(&job.key());
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        let outcome = restore(&ctx, &mut state, &mut listener).await.unwrap();

        assert_eq!(outcome, RestoreOutcome::ExistingHome);
        assert_eq!(store.restore_calls(), 0);
        assert!(listener.cache_disabled);
        assert_eq!(listener.cache_status_reason, EXISTING_GRADLE_HOME);
        assert!(!state.cache_restored);
    }

    #[tokio::test]
    async fn existing_home_is_overwritten_when_allowed() {
        let mut job = Job::new();
        job.config.overwrite_existing = true;
        job.populate_home();
        let store = MemoryStore::default().with_entry(&job.key());
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        let outcome = restore(&ctx, &mut state, &mut listener).await.unwrap();

        assert_eq!(outcome, RestoreOutcome::Restored { key: job.key() });
        assert_eq!(state.restored_cache_key, Some(job.key()));
    }

    #[tokio::test]
    async fn disabled_and_unavailable_only_initialise() {
        let mut job = Job::new();
        job.config.disabled = true;
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        assert_eq!(
            restore(&ctx, &mut state, &mut listener).await.unwrap(),
            RestoreOutcome::Disabled
        );
        assert_eq!(listener.cache_status(), "disabled");
        assert!(home.join(".setup-gradle").is_dir());

        let job = Job::new();
        let store = MemoryStore::unavailable();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        assert_eq!(
            restore(&ctx, &mut state, &mut listener).await.unwrap(),
            RestoreOutcome::Unavailable
        );
        assert_eq!(listener.cache_status(), "not available");
        assert_eq!(store.restore_calls(), 0);

        let tools_runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &tools_runner,
        };
        let outcome = save(&ctx, &state, &mut listener, &BuildResults::default(), &tools).await;
        assert_eq!(outcome, SaveOutcome::Disabled);
        assert!(stops.stops().is_empty());
    }

    #[tokio::test]
    async fn write_only_skips_restore_but_saves() {
        let mut job = Job::new();
        job.config.write_only = true;
        job.config.read_only = true;
        job.config.cleanup = CleanupMode::Never;
        let store = MemoryStore::default().with_entry(&job.key());
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        let outcome = restore(&ctx, &mut state, &mut listener).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::WriteOnly);
        assert_eq!(store.restore_calls(), 0);
        assert_eq!(listener.cache_status(), "write-only");

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let outcome = save(&ctx, &state, &mut listener, &BuildResults::default(), &tools).await;

        // Another job saved the same key first
        assert_eq!(outcome, SaveOutcome::Saved { key: job.key() });
        let entry = listener.get(HOME_CACHE_DESCRIPTION).unwrap();
        assert_eq!(entry.saved_key, Some(job.key()));
        assert_eq!(entry.saved_size, Some(0));
    }

    #[tokio::test]
    async fn read_only_never_saves() {
        let mut job = Job::new();
        job.config.read_only = true;
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();
        restore(&ctx, &mut state, &mut listener).await.unwrap();
        assert_eq!(state.cleanup_timestamp, None);

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let outcome = save(&ctx, &state, &mut listener, &BuildResults::default(), &tools).await;

        assert_eq!(outcome, SaveOutcome::ReadOnly);
        assert_eq!(store.save_calls(), 0);
        assert!(stops.stops().is_empty());
        assert_eq!(listener.cache_status(), "read-only");
        assert_eq!(listener.cache_cleanup_message, CLEANUP_DISABLED_READONLY);
    }

    #[tokio::test]
    async fn save_requires_restore_in_this_job() {
        let job = Job::new();
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };

        let outcome = save(
            &ctx,
            &JobState::default(),
            &mut CacheListener::new(),
            &BuildResults::default(),
            &tools,
        )
        .await;

        assert_eq!(outcome, SaveOutcome::NotRestored);
        assert_eq!(store.save_calls(), 0);
    }

    #[tokio::test]
    async fn unchanged_key_skips_store_writes() {
        let mut job = Job::new();
        job.config.cleanup = CleanupMode::Never;
        let store = MemoryStore::default().with_entry(&job.key());
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        let restored = restore(&ctx, &mut state, &mut listener).await.unwrap();
        assert_eq!(restored, RestoreOutcome::Restored { key: job.key() });

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let outcome = save(&ctx, &state, &mut listener, &BuildResults::default(), &tools).await;

        assert_eq!(outcome, SaveOutcome::Unchanged { key: job.key() });
        assert_eq!(store.save_calls(), 0);
        assert_eq!(
            listener.get(HOME_CACHE_DESCRIPTION).unwrap().not_saved.as_deref(),
            Some("cache key not changed")
        );
    }

    #[tokio::test]
    async fn daemons_stop_before_save_and_cleanup_runs() {
        let job = Job::new();
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();
        restore(&ctx, &mut state, &mut listener).await.unwrap();
        assert!(state.cleanup_timestamp.is_some());
        job.populate_home();

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner {
            launcher: Some(PathBuf::from("/tools/gradle-8.11/bin/gradle")),
            ..FixedProvisioner::default()
        };
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let results = BuildResults::new(vec![result("8.5", "/opt/gradle-8.5", false)]);
        let outcome = save(&ctx, &state, &mut listener, &results, &tools).await;

        assert_eq!(outcome, SaveOutcome::Saved { key: job.key() });
        assert_eq!(stops.stops(), vec![0]);
        assert_eq!(store.save_calls(), 1);
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert_eq!(listener.cache_cleanup_message, DEFAULT_CLEANUP_ENABLED_REASON);
    }

    #[tokio::test]
    async fn failed_build_skips_cleanup_on_success_mode() {
        let job = Job::new();
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();
        restore(&ctx, &mut state, &mut listener).await.unwrap();

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let results = BuildResults::new(vec![result("8.12", "/opt/gradle-8.12", true)]);
        save(&ctx, &state, &mut listener, &results, &tools).await;

        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(listener.cache_cleanup_message, CLEANUP_DISABLED_DUE_TO_FAILURE);
        assert_eq!(store.save_calls(), 1);
    }

    #[tokio::test]
    async fn config_cache_hit_skips_cleanup() {
        let mut job = Job::new();
        job.config.cleanup = CleanupMode::Always;
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();
        restore(&ctx, &mut state, &mut listener).await.unwrap();

        let runner = RecordingRunner::default();
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let mut hit = result("8.12", "/opt/gradle-8.12", false);
        hit.config_cache_hit = true;
        save(&ctx, &state, &mut listener, &BuildResults::new(vec![hit]), &tools).await;

        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(listener.cache_cleanup_message, CLEANUP_DISABLED_DUE_TO_CONFIG_CACHE_HIT);
    }

    #[tokio::test]
    async fn cleanup_failure_still_saves() {
        let mut job = Job::new();
        job.config.cleanup = CleanupMode::Always;
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();
        restore(&ctx, &mut state, &mut listener).await.unwrap();

        let runner = RecordingRunner::default();
        // Provisioning fails: no launcher available
        let provisioner = FixedProvisioner::default();
        let stops = StopRecorder::new(&store);
        let tools = BuildTools {
            processes: &stops,
            provisioner: &provisioner,
            runner: &runner,
        };
        let results = BuildResults::new(vec![result("8.12", "/opt/gradle-8.12", true)]);
        let outcome = save(&ctx, &state, &mut listener, &results, &tools).await;

        assert_eq!(outcome, SaveOutcome::Saved { key: job.key() });
        assert_eq!(store.save_calls(), 1);
    }

    #[tokio::test]
    async fn strict_match_requests_single_restore_key() {
        let mut job = Job::new();
        job.config.strict_match = true;
        let store = MemoryStore::default();
        let (user, home, tmp) = paths(&job);
        let ctx = context!(job, &store, user, home, tmp);
        let mut state = JobState::default();
        let mut listener = CacheListener::new();

        restore(&ctx, &mut state, &mut listener).await.unwrap();

        let entry = listener.get(HOME_CACHE_DESCRIPTION).unwrap();
        assert_eq!(entry.requested_restore_keys.as_ref().map(Vec::len), Some(1));
        assert_eq!(listener.cache_cleanup_message, DEFAULT_CLEANUP_DISABLED_REASON);
    }
}
