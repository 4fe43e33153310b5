//! Error types for gradle-cache
//!
//! All modules use `CacheResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache engine operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in the cache engine
#[derive(Error, Debug)]
pub enum CacheError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("The value '{value}' is not valid for {name}. {reason}")]
    InvalidInput {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Store errors
    #[error("Cache store is not available: {0}")]
    StoreUnavailable(String),

    #[error("Cache entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("Cache store error for key {key}: {reason}")]
    Store { key: String, reason: String },

    #[error("Failed to archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // Job state errors
    #[error("Failed to persist job state: {0}")]
    StatePersist(String),

    #[error("Job state version {found} is not supported (expected {expected})")]
    StateVersion { found: u32, expected: u32 },

    // Gradle errors
    #[error("Gradle executable not found: {0}")]
    GradleNotFound(PathBuf),

    #[error("Failed to provision Gradle {version}: {reason}")]
    Provision { version: String, reason: String },

    #[error("Cache cleanup failed: {0}")]
    CleanupFailed(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, exit code: {code}")]
    CommandExecution { command: String, code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a store error for a key
    pub fn store(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Store {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Configuration errors abort the job: the pipeline cannot proceed safely
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. } | Self::InvalidInput { .. } | Self::ConfigDirCreate { .. }
        )
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Provision { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidInput { .. } => Some("Check the action inputs in your workflow file"),
            Self::StoreUnavailable(_) => {
                Some("Set GRADLE_CACHE_STORE_DIR or [store] dir in the config")
            }
            Self::StateVersion { .. } => {
                Some("Run the restore and save phases with the same version")
            }
            Self::GradleNotFound(_) => Some("Install Gradle or make the wrapper available"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CacheError::InvalidInput {
            name: "cache-cleanup".to_string(),
            value: "sometimes".to_string(),
            reason: "Valid values are: [never, always, on-success].".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The value 'sometimes' is not valid for cache-cleanup. Valid values are: [never, always, on-success]."
        );
    }

    #[test]
    fn error_hint() {
        let err = CacheError::StoreUnavailable("no directory".to_string());
        assert!(err.hint().unwrap().contains("GRADLE_CACHE_STORE_DIR"));
    }

    #[test]
    fn config_errors_are_fatal_class() {
        let err = CacheError::ConfigInvalid {
            path: PathBuf::from("gradle-cache.toml"),
            reason: "bad".to_string(),
        };
        assert!(err.is_config_error());
        assert!(!CacheError::EntryAlreadyExists("k".to_string()).is_config_error());
    }

    #[test]
    fn error_retryable() {
        assert!(CacheError::store("k", "timeout").is_retryable());
        assert!(!CacheError::EntryAlreadyExists("k".to_string()).is_retryable());
    }
}
