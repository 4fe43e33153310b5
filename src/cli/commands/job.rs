//! Resources of the running job shared by the phase commands

use crate::cache::{CacheContext, DirectoryStore, KeyContext};
use crate::config::{CacheConfig, Config, ConfigManager};
use crate::error::CacheResult;
use crate::runner::JobEnvironment;
use crate::state::JobState;
use std::path::PathBuf;
use tracing::debug;

pub struct Job {
    pub user_home: PathBuf,
    pub gradle_user_home: PathBuf,
    pub tmp_dir: PathBuf,
    pub key_context: KeyContext,
    pub environment: JobEnvironment,
    pub store: DirectoryStore,
}

impl Job {
    /// Resolve from the environment, preferring the homes recorded by restore
    pub fn resolve(config: &Config, state: &JobState) -> CacheResult<Self> {
        let user_home = match &state.user_home {
            Some(home) => home.clone(),
            None => ConfigManager::user_home()?,
        };
        let gradle_user_home = state
            .gradle_user_home
            .clone()
            .unwrap_or_else(|| ConfigManager::gradle_user_home(&user_home));
        debug!("Using Gradle User Home {}", gradle_user_home.display());

        Ok(Self {
            user_home,
            gradle_user_home,
            tmp_dir: ConfigManager::runner_temp(),
            key_context: KeyContext::from_env(),
            environment: JobEnvironment::from_env(),
            store: DirectoryStore::from_config(&config.store),
        })
    }

    pub fn context<'a>(&'a self, config: &'a CacheConfig) -> CacheContext<'a> {
        CacheContext {
            config,
            key_context: &self.key_context,
            store: &self.store,
            environment: &self.environment,
            user_home: &self.user_home,
            gradle_user_home: &self.gradle_user_home,
            tmp_dir: &self.tmp_dir,
        }
    }

    /// Where provisioned Gradle distributions are kept
    pub fn tool_dir(&self) -> PathBuf {
        match std::env::var_os("RUNNER_TOOL_CACHE") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("gradle-cache"),
            _ => self.tmp_dir.join("gradle-installations"),
        }
    }
}
