//! The main Gradle User Home cache entry
//!
//! Owns the layout decisions for Gradle User Home: which paths are cached,
//! which are always removed, and the one-off initialisation done before the
//! first build of the job.

use crate::build_results::BuildResult;
use crate::cache::extract::{EntryExtractor, ExtractorKind, ACTION_METADATA_DIR};
use crate::cache::files::{expand_glob, try_delete};
use crate::cache::key::{generate_cache_key, CacheKey, KeyContext};
use crate::cache::report::CacheListener;
use crate::cache::store::{restore_cache, save_cache, CacheStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::runner::JobEnvironment;
use futures_util::future::join;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Logical name of the main cache entry, part of its key
pub const HOME_CACHE_NAME: &str = "home";

/// Listener entry name of the main cache entry
pub const HOME_CACHE_DESCRIPTION: &str = "Gradle User Home";

/// Always deleted: the configuration-cache keystore must never be shared
const CC_KEYSTORE_PATTERN: &str = "caches/*/cc-keystore";

const INFO_PROPERTIES: &str = "org.gradle.logging.level=info\norg.gradle.logging.stacktrace=all\n";

/// Result of asking the main entry to save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeSave {
    /// The entry was restored with the key we would save under
    KeyUnchanged(String),
    /// Saving under this key was attempted; the listener has the outcome
    Attempted(String),
    /// Preparing the save failed; nothing was written
    Aborted(String),
}

pub struct GradleUserHomeCache<'a> {
    user_home: &'a Path,
    gradle_user_home: &'a Path,
    config: &'a CacheConfig,
    key_context: &'a KeyContext,
    environment: &'a JobEnvironment,
}

impl<'a> GradleUserHomeCache<'a> {
    pub fn new(
        user_home: &'a Path,
        gradle_user_home: &'a Path,
        config: &'a CacheConfig,
        key_context: &'a KeyContext,
        environment: &'a JobEnvironment,
    ) -> Self {
        Self {
            user_home,
            gradle_user_home,
            config,
            key_context,
            environment,
        }
    }

    /// Prepare Gradle User Home for the builds of this job
    pub fn init(&self) -> CacheResult<()> {
        let metadata_dir = self.gradle_user_home.join(ACTION_METADATA_DIR);
        std::fs::create_dir_all(&metadata_dir)
            .map_err(|e| CacheError::io(format!("creating {}", metadata_dir.display()), e))?;

        self.register_toolchains()?;

        if self.environment.debug {
            self.configure_info_log_level()?;
        }

        if let Some(key) = self.config.encryption_key() {
            self.environment.export_variable("GRADLE_ENCRYPTION_KEY", key)?;
        }
        Ok(())
    }

    /// Whether a previous build already wrote to this Gradle User Home
    pub fn cache_output_exists(&self) -> bool {
        let caches = self.gradle_user_home.join("caches");
        if caches.exists() {
            debug!("Cache output exists at {}", caches.display());
            return true;
        }
        false
    }

    pub fn cache_key(&self) -> CacheKey {
        generate_cache_key(HOME_CACHE_NAME, self.config, self.key_context)
    }

    /// Restore the closest match for this job, then its extracted entries.
    ///
    /// Returns the key that was restored, if any.
    pub async fn restore(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
    ) -> Option<String> {
        let key = self.cache_key();
        debug!(
            "Requesting {} with key: {} restoreKeys: [{}]",
            HOME_CACHE_DESCRIPTION,
            key.key,
            key.restore_keys.join(", ")
        );

        let paths = self.cache_paths();
        let entry = listener.entry(HOME_CACHE_DESCRIPTION);
        let restored = restore_cache(store, &paths, &key.key, &key.restore_keys, entry).await;
        let Some(hit) = restored else {
            info!(
                "{} cache not found. Will initialize empty.",
                HOME_CACHE_DESCRIPTION
            );
            return None;
        };

        if let Err(e) = self.after_restore(store, listener).await {
            warn!(
                "Restore {} failed in 'afterRestore': {}",
                HOME_CACHE_DESCRIPTION, e
            );
        }
        Some(hit.key)
    }

    async fn after_restore(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
    ) -> CacheResult<()> {
        self.extractor(ExtractorKind::GradleHome)
            .restore(store, listener)
            .await?;
        self.extractor(ExtractorKind::ConfigurationCache)
            .restore(store, listener)
            .await?;
        self.delete_excluded_paths().await
    }

    /// Save under the current key, unless that exact key was restored
    pub async fn save(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
        restored_key: Option<&str>,
        build_results: &[BuildResult],
    ) -> HomeSave {
        let key = self.cache_key().key;

        if restored_key == Some(key.as_str()) {
            info!("Cache hit occurred on the cache key {}, not saving cache.", key);
            for entry in &mut listener.cache_entries {
                if entry.entry_name == HOME_CACHE_DESCRIPTION {
                    entry.mark_not_saved("cache key not changed");
                } else {
                    entry.mark_not_saved(&format!(
                        "referencing '{}' cache entry not saved",
                        HOME_CACHE_DESCRIPTION
                    ));
                }
            }
            return HomeSave::KeyUnchanged(key);
        }

        if let Err(e) = self.before_save(store, listener, build_results).await {
            warn!(
                "Save {} failed in 'beforeSave': {}",
                HOME_CACHE_DESCRIPTION, e
            );
            return HomeSave::Aborted(e.to_string());
        }

        let paths = self.cache_paths();
        save_cache(store, &paths, &key, listener.entry(HOME_CACHE_DESCRIPTION)).await;
        HomeSave::Attempted(key)
    }

    async fn before_save(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
        build_results: &[BuildResult],
    ) -> CacheResult<()> {
        self.delete_excluded_paths().await?;

        let baseline = listener.clone();
        let mut home_listener = baseline.clone();
        let mut config_cache_listener = baseline.clone();
        let home = self.extractor(ExtractorKind::GradleHome);
        let config_cache = self
            .extractor(ExtractorKind::ConfigurationCache)
            .with_build_results(build_results);

        let (home_result, config_cache_result) = join(
            home.extract(store, &mut home_listener),
            config_cache.extract(store, &mut config_cache_listener),
        )
        .await;

        listener.merge_changes(&baseline, home_listener);
        listener.merge_changes(&baseline, config_cache_listener);
        home_result.and(config_cache_result)
    }

    fn extractor(&self, kind: ExtractorKind) -> EntryExtractor<'a> {
        EntryExtractor::new(
            kind,
            self.gradle_user_home,
            self.config,
            &self.key_context.prefix,
        )
    }

    /// Delete the configured excludes and the configuration-cache keystore
    pub async fn delete_excluded_paths(&self) -> CacheResult<()> {
        let patterns = self
            .config
            .excludes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(CC_KEYSTORE_PATTERN));

        for pattern in patterns {
            let resolved = self.gradle_user_home.join(pattern);
            debug!("Removing excluded path: {}", resolved.display());
            for path in expand_glob(&resolved.to_string_lossy())? {
                debug!("Removing excluded file: {}", path.display());
                try_delete(&path).await?;
            }
        }
        Ok(())
    }

    /// Absolute paths to cache; `!` entries stay exclusions
    pub fn cache_paths(&self) -> Vec<String> {
        let paths: Vec<String> = self
            .config
            .includes
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(ACTION_METADATA_DIR))
            .map(|raw| self.resolve_cache_path(raw))
            .collect();
        debug!("Using cache paths: {:?}", paths);
        paths
    }

    fn resolve_cache_path(&self, raw: &str) -> String {
        match raw.strip_prefix('!') {
            Some(rest) => format!("!{}", self.resolve_cache_path(rest)),
            None => self.gradle_user_home.join(raw).to_string_lossy().to_string(),
        }
    }

    /// Write the runner's pre-installed JDKs to `~/.m2/toolchains.xml`
    fn register_toolchains(&self) -> CacheResult<()> {
        let Some(toolchains) = toolchains_xml(&self.environment.java_homes) else {
            return Ok(());
        };

        let m2 = self.user_home.join(".m2");
        let target = m2.join("toolchains.xml");
        if target.exists() {
            let existing = std::fs::read_to_string(&target)
                .map_err(|e| CacheError::io(format!("reading {}", target.display()), e))?;
            std::fs::write(&target, merge_toolchains(&existing, &toolchains))
                .map_err(|e| CacheError::io(format!("writing {}", target.display()), e))?;
            info!("Merged default JDK locations into {}", target.display());
        } else {
            std::fs::create_dir_all(&m2)
                .map_err(|e| CacheError::io(format!("creating {}", m2.display()), e))?;
            std::fs::write(&target, toolchains)
                .map_err(|e| CacheError::io(format!("writing {}", target.display()), e))?;
            info!("Wrote default JDK locations to {}", target.display());
        }
        Ok(())
    }

    /// Run every build with `--info` and full stacktraces
    fn configure_info_log_level(&self) -> CacheResult<()> {
        let file = self.gradle_user_home.join("gradle.properties");
        let content = if file.exists() {
            let existing = std::fs::read_to_string(&file)
                .map_err(|e| CacheError::io(format!("reading {}", file.display()), e))?;
            info!(
                "Merged --info and --stacktrace into existing {} file",
                file.display()
            );
            format!("{}\n{}", INFO_PROPERTIES, existing)
        } else {
            info!("Created a new {} with --info and --stacktrace", file.display());
            INFO_PROPERTIES.to_string()
        };
        std::fs::write(&file, content)
            .map_err(|e| CacheError::io(format!("writing {}", file.display()), e))
    }
}

fn toolchains_xml(java_homes: &[(u32, PathBuf)]) -> Option<String> {
    if java_homes.is_empty() {
        return None;
    }
    let toolchains = java_homes
        .iter()
        .map(|(version, path)| {
            format!(
                "  <toolchain>\n    <type>jdk</type>\n    <provides>\n      <version>{}</version>\n    </provides>\n    <configuration>\n      <jdkHome>{}</jdkHome>\n    </configuration>\n  </toolchain>",
                version,
                path.display()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<toolchains>\n<!-- JDK Toolchains installed by default on GitHub-hosted runners -->\n{}\n</toolchains>\n",
        toolchains
    ))
}

fn merge_toolchains(existing: &str, generated: &str) -> String {
    let appended = generated.rsplit("<toolchains>").next().unwrap_or(generated);
    existing.replacen("</toolchains>", appended, 1)
}
