//! Configuration management for gradle-cache
//!
//! Configuration comes from an optional TOML file, overlaid once with the
//! action inputs (`INPUT_*` variables) of the running job. The engine only
//! ever sees the resulting typed [`Config`].

pub mod schema;

pub use schema::{CacheConfig, CleanupMode, Config};

use crate::error::{CacheError, CacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Environment variable that forces cache debug logging
pub const CACHE_DEBUG_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_DEBUG_ENABLED";

/// Environment variable listing extracted artifact types not to restore
pub const SKIP_RESTORE_VAR: &str = "GRADLE_BUILD_ACTION_SKIP_RESTORE";

/// Environment variable pointing at the cache store directory
pub const STORE_DIR_VAR: &str = "GRADLE_CACHE_STORE_DIR";

const DEPRECATION_UPGRADE_PAGE: &str =
    "https://github.com/gradle/actions/blob/main/docs/deprecation-upgrade-guide.md";

const BOOLEAN_VALUES: &str =
    "Support boolean input list: `true | True | TRUE | false | False | FALSE`";

/// Deprecation warnings collected while reading configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deprecations(Vec<String>);

impl Deprecations {
    /// Record a deprecation message, once
    pub fn record(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.0.contains(&message) {
            self.0.push(message);
        }
    }

    /// All recorded messages
    pub fn messages(&self) -> &[String] {
        &self.0
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Upgrade guide section for a message
    pub fn documentation_link(message: &str) -> String {
        let anchor: String = message
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
            .map(|c| if c == ' ' { '-' } else { c })
            .collect();
        format!("{}#{}", DEPRECATION_UPGRADE_PAGE, anchor)
    }

    /// Report section listing the deprecated inputs used; empty when none
    pub fn render(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let mut out = String::from(
            "Deprecation warnings\nThis job uses deprecated configuration. Follow the links for upgrade details.\n",
        );
        for message in &self.0 {
            let link = Self::documentation_link(message);
            out.push_str(&format!("- {} ({})\n", message, link));
        }
        out.push('\n');
        out
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gradle-cache")
            .join("config.toml")
    }

    /// Temporary directory of the CI runner
    pub fn runner_temp() -> PathBuf {
        std::env::var_os("RUNNER_TEMP")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Default location of the persisted job state
    pub fn default_state_path() -> PathBuf {
        state_path_from(|name| std::env::var(name).ok())
    }

    /// Directory where build results are written by the instrumented builds
    pub fn build_results_dir() -> PathBuf {
        Self::runner_temp().join(".build-results")
    }

    /// The user home directory
    pub fn user_home() -> CacheResult<PathBuf> {
        dirs::home_dir()
            .ok_or_else(|| CacheError::Internal("cannot determine user home".to_string()))
    }

    /// The Gradle User Home: `GRADLE_USER_HOME` or `~/.gradle`
    pub fn gradle_user_home(user_home: &Path) -> PathBuf {
        match std::env::var_os("GRADLE_USER_HOME") {
            Some(dir) if !dir.is_empty() => user_home.join(dir),
            _ => user_home.join(".gradle"),
        }
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> CacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration and overlay the process environment
    pub async fn load_with_env(&self) -> CacheResult<(Config, Deprecations)> {
        let mut config = self.load().await?;
        let deprecations = apply_inputs(&mut config, |name| std::env::var(name).ok())?;
        for message in deprecations.messages() {
            warn!("{}", message);
        }
        Ok((config, deprecations))
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CacheError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Job state location for the given environment.
///
/// `RUNNER_TEMP` is private to one job. Without it the state goes to the shared
/// temp dir, so the file name carries the run and job it belongs to.
fn state_path_from<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup("RUNNER_TEMP").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join(".gradle-cache").join("job-state.json");
    }

    let job_id = ["GITHUB_RUN_ID", "GITHUB_RUN_ATTEMPT", "GITHUB_JOB"]
        .iter()
        .filter_map(|name| lookup(name).filter(|v| !v.is_empty()))
        .map(|v| {
            v.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-");
    let name = if job_id.is_empty() {
        "job-state.json".to_string()
    } else {
        format!("job-state-{}.json", job_id)
    };
    std::env::temp_dir().join(".gradle-cache").join(name)
}

/// Overlay action inputs and related variables onto `config`.
///
/// `lookup` resolves an environment variable name. Every recognised value is
/// validated here so the engine never sees an invalid option.
pub fn apply_inputs<F>(config: &mut Config, lookup: F) -> CacheResult<Deprecations>
where
    F: Fn(&str) -> Option<String>,
{
    let inputs = Inputs { lookup: &lookup };
    let mut deprecations = Deprecations::default();
    let cache = &mut config.cache;

    if let Some(v) = inputs.boolean("cache-disabled")? {
        cache.disabled = v;
    }
    if let Some(v) = inputs.boolean("cache-read-only")? {
        cache.read_only = v;
    }
    if let Some(v) = inputs.boolean("cache-write-only")? {
        cache.write_only = v;
    }
    if let Some(v) = inputs.boolean("cache-overwrite-existing")? {
        cache.overwrite_existing = v;
    }
    if let Some(v) = inputs.boolean("gradle-home-cache-strict-match")? {
        cache.strict_match = v;
    }

    if let Some(legacy) = inputs.boolean("gradle-home-cache-cleanup")? {
        deprecations.record(
            "The `gradle-home-cache-cleanup` input parameter has been replaced by `cache-cleanup`",
        );
        cache.cleanup = if legacy {
            CleanupMode::Always
        } else {
            CleanupMode::Never
        };
    } else if let Some(raw) = inputs.get("cache-cleanup") {
        cache.cleanup = CleanupMode::parse(&raw).ok_or_else(|| CacheError::InvalidInput {
            name: "cache-cleanup".to_string(),
            value: raw.clone(),
            reason: "Valid values are: [never, always, on-success].".to_string(),
        })?;
    }

    if let Some(key) = inputs.get("cache-encryption-key") {
        cache.encryption_key = Some(key);
    }
    if let Some(includes) = inputs.multiline("gradle-home-cache-includes") {
        cache.includes = includes;
    }
    if let Some(excludes) = inputs.multiline("gradle-home-cache-excludes") {
        cache.excludes = excludes;
    }
    if let Some(matrix) = inputs.get("workflow-job-context") {
        cache.job_matrix = matrix;
    }

    if lookup(CACHE_DEBUG_VAR).is_some_and(|v| !v.is_empty()) {
        cache.debug = true;
    }
    if let Some(skip) = lookup(SKIP_RESTORE_VAR) {
        cache.skip_restore = skip
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(dir) = lookup(STORE_DIR_VAR).filter(|v| !v.is_empty()) {
        config.store.dir = Some(PathBuf::from(dir));
    }

    Ok(deprecations)
}

/// Typed access to `INPUT_*` variables
struct Inputs<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Inputs<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        let var = format!("INPUT_{}", name.replace(' ', "_").to_uppercase());
        (self.lookup)(&var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn boolean(&self, name: &str) -> CacheResult<Option<bool>> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        match raw.as_str() {
            "true" | "True" | "TRUE" => Ok(Some(true)),
            "false" | "False" | "FALSE" => Ok(Some(false)),
            _ => Err(CacheError::InvalidInput {
                name: name.to_string(),
                value: raw,
                reason: BOOLEAN_VALUES.to_string(),
            }),
        }
    }

    fn multiline(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|raw| {
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}
