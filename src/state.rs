//! Job state carried from the restore phase to the save phase
//!
//! The two phases run as separate processes, so everything the save phase
//! needs is written to a JSON file at the end of restore.

use crate::cache::report::CacheListener;
use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Persisted state of one CI job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Format version of this file
    pub version: u32,

    /// The restore phase ran to completion
    #[serde(default)]
    pub setup_completed: bool,

    /// Restore logic already ran this job
    #[serde(default)]
    pub restore_attempted: bool,

    /// Gradle User Home was initialised for caching, so the save phase may run
    #[serde(default)]
    pub cache_restored: bool,

    /// Key of the main entry that was restored
    #[serde(default)]
    pub restored_cache_key: Option<String>,

    /// Start of the job's builds (ms since epoch), when cleanup is enabled
    #[serde(default)]
    pub cleanup_timestamp: Option<i64>,

    #[serde(default)]
    pub user_home: Option<PathBuf>,

    #[serde(default)]
    pub gradle_user_home: Option<PathBuf>,

    /// Serialized [`CacheListener`]
    #[serde(default)]
    pub cache_listener: String,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            setup_completed: false,
            restore_attempted: false,
            cache_restored: false,
            restored_cache_key: None,
            cleanup_timestamp: None,
            user_home: None,
            gradle_user_home: None,
            cache_listener: String::new(),
        }
    }
}

impl JobState {
    pub const VERSION: u32 = 1;

    /// Load state from `path`; a missing file is a fresh job
    pub async fn load(path: &Path) -> CacheResult<Self> {
        if !path.exists() {
            debug!("No job state at {}, starting fresh", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading job state {}", path.display()), e))?;
        let state: JobState = serde_json::from_str(&content)?;

        if state.version != Self::VERSION {
            return Err(CacheError::StateVersion {
                found: state.version,
                expected: Self::VERSION,
            });
        }
        Ok(state)
    }

    pub async fn save(&self, path: &Path) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| {
                    CacheError::StatePersist(format!("creating {}: {}", parent.display(), e))
                })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| CacheError::StatePersist(format!("writing {}: {}", path.display(), e)))?;
        debug!("Saved job state to {}", path.display());
        Ok(())
    }

    /// The listener recorded so far
    pub fn listener(&self) -> CacheResult<CacheListener> {
        CacheListener::rehydrate(&self.cache_listener)
    }

    pub fn set_listener(&mut self, listener: &CacheListener) -> CacheResult<()> {
        self.cache_listener = listener.stringify()?;
        Ok(())
    }
}
