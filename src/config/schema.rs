//! Configuration schema for gradle-cache
//!
//! Configuration is stored at `~/.config/gradle-cache/config.toml` and
//! overlaid with the action inputs of the running job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache behaviour
    pub cache: CacheConfig,

    /// Cache store settings
    pub store: StoreConfig,

    /// Gradle provisioning for cache cleanup
    pub cleanup: CleanupConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// When cache cleanup runs before saving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupMode {
    /// Never clean up
    Never,
    /// Clean up unless a build failed
    #[default]
    OnSuccess,
    /// Always clean up
    Always,
}

impl CleanupMode {
    /// Parse an input value, accepting surrounding whitespace and any case
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "never" => Some(Self::Never),
            "on-success" => Some(Self::OnSuccess),
            "always" => Some(Self::Always),
            _ => None,
        }
    }
}

impl fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::OnSuccess => write!(f, "on-success"),
            Self::Always => write!(f, "always"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable caching entirely
    pub disabled: bool,

    /// Restore but never save
    pub read_only: bool,

    /// Save but never restore (takes precedence over read_only)
    pub write_only: bool,

    /// Restore over a pre-existing Gradle User Home
    pub overwrite_existing: bool,

    /// Only restore entries for the same job and matrix
    pub strict_match: bool,

    /// Cleanup mode
    pub cleanup: CleanupMode,

    /// Key used by Gradle to encrypt configuration-cache data
    pub encryption_key: Option<String>,

    /// Paths (relative to Gradle User Home) to cache; `!` excludes
    pub includes: Vec<String>,

    /// Paths (relative to Gradle User Home) deleted before saving
    pub excludes: Vec<String>,

    /// Matrix context JSON of the running job
    pub job_matrix: String,

    /// Extracted artifact types that must not be restored
    pub skip_restore: Vec<String>,

    /// Log cache decisions at info level
    pub debug: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            read_only: false,
            write_only: false,
            overwrite_existing: false,
            strict_match: false,
            cleanup: CleanupMode::default(),
            encryption_key: None,
            includes: vec!["caches".to_string(), "notifications".to_string()],
            excludes: vec![],
            job_matrix: String::new(),
            skip_restore: vec![],
            debug: false,
        }
    }
}

impl CacheConfig {
    /// Read-only is ignored when write-only is set
    pub fn is_read_only(&self) -> bool {
        !self.write_only && self.read_only
    }

    /// Whether a cleanup may happen at all this job
    pub fn is_cleanup_enabled(&self) -> bool {
        if self.is_read_only() {
            return false;
        }
        matches!(self.cleanup, CleanupMode::Always | CleanupMode::OnSuccess)
    }

    /// Whether cleanup should run given the build outcome
    pub fn should_perform_cleanup(&self, has_failure: bool) -> bool {
        match self.cleanup {
            CleanupMode::Always => true,
            CleanupMode::OnSuccess => !has_failure,
            CleanupMode::Never => false,
        }
    }

    /// The encryption key, if one was provided and is non-empty
    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding cache archives (store unavailable when unset)
    pub dir: Option<PathBuf>,
}

/// Gradle provisioning settings for cache cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Base URL for Gradle distributions
    pub distributions_url: String,

    /// Directory where downloaded distributions are unpacked
    pub tool_dir: Option<PathBuf>,

    /// Download attempts before giving up
    pub download_attempts: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            distributions_url: "https://services.gradle.org/distributions".to_string(),
            tool_dir: None,
            download_attempts: 3,
        }
    }
}
