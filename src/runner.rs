//! The CI runner hosting the job
//!
//! Everything the engine needs from the runner's environment is read once
//! into [`JobEnvironment`].

use crate::error::{CacheError, CacheResult};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

/// Runner facts captured at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobEnvironment {
    /// File receiving variables exported to later steps (`GITHUB_ENV`)
    pub github_env: Option<PathBuf>,
    /// Pre-installed JDKs as `(major version, path)`, sorted by version
    pub java_homes: Vec<(u32, PathBuf)>,
    /// Runner debug logging is enabled
    pub debug: bool,
}

impl JobEnvironment {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = Self::default();
        for (name, value) in vars {
            if value.is_empty() {
                continue;
            }
            match name.as_str() {
                "GITHUB_ENV" => env.github_env = Some(PathBuf::from(value)),
                "RUNNER_DEBUG" => env.debug = value == "1",
                _ => {
                    if let Some(version) = java_home_version(&name) {
                        env.java_homes.push((version, PathBuf::from(value)));
                    }
                }
            }
        }
        env.java_homes.sort();
        env
    }

    /// Make `name=value` visible to the following steps of the job.
    ///
    /// Uses the multiline `GITHUB_ENV` syntax with a random delimiter so the
    /// value cannot terminate the block early.
    pub fn export_variable(&self, name: &str, value: &str) -> CacheResult<()> {
        let Some(path) = &self.github_env else {
            debug!("No job environment file, not exporting {}", name);
            return Ok(());
        };

        let delimiter = format!("ghadelimiter_{}", Uuid::new_v4());
        if name.contains(&delimiter) || value.contains(&delimiter) {
            return Err(CacheError::Internal(format!(
                "unexpected delimiter in value of {}",
                name
            )));
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CacheError::io(format!("opening {}", path.display()), e))?;
        write!(file, "{}<<{}\n{}\n{}\n", name, delimiter, value, delimiter)
            .map_err(|e| CacheError::io(format!("writing {}", path.display()), e))?;

        info!("Exported {} to the job environment", name);
        Ok(())
    }
}

/// `JAVA_HOME_17_X64` -> 17
fn java_home_version(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("JAVA_HOME_")?;
    let (version, _arch) = rest.split_once('_')?;
    version.parse().ok()
}
