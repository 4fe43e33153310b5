//! Extracted cache entries
//!
//! Large, slowly-changing parts of Gradle User Home (downloaded dependencies,
//! wrapper distributions, JDKs, ...) are cached in their own entries keyed by
//! their content, so a change elsewhere in the home does not invalidate them.
//!
//! Before the main entry is saved, each matching path is saved separately and
//! then deleted from the home. The keys used are recorded in
//! `.setup-gradle/<extractor>.json`; after the main entry is restored, that
//! metadata tells us which extracted entries to restore.

use crate::build_results::BuildResult;
use crate::cache::files::{expand_patterns, try_delete};
use crate::cache::hash::{hash_file_names, hash_files};
use crate::cache::key::{cache_key_base, CACHE_PROTOCOL_VERSION};
use crate::cache::report::{CacheEntryListener, CacheListener};
use crate::cache::store::{restore_cache, save_cache, CacheStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::gradle::version_is_at_least;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory in Gradle User Home holding metadata written by this tool
pub const ACTION_METADATA_DIR: &str = ".setup-gradle";

const SKIP_RESTORE_KEY: &str = "SKIP_RESTORE";
const CONFIG_CACHE_MIN_GRADLE: &str = "8.6.0";
const CONFIG_CACHE_TOO_OLD: &str = "Configuration cache data only saved for Gradle 8.6+";

/// A set of paths in Gradle User Home cached separately from the main entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCacheEntryDefinition {
    pub artifact_type: String,
    /// Absolute glob patterns, newline separated
    pub pattern: String,
    /// Cache every match in one entry rather than one entry per match
    pub bundle: bool,
    /// Matched file names identify their content, so the key can hash names only
    pub unique_file_names: bool,
    pub not_cacheable_reason: Option<String>,
}

impl ExtractedCacheEntryDefinition {
    pub fn new(artifact_type: &str, pattern: impl Into<String>, bundle: bool) -> Self {
        Self {
            artifact_type: artifact_type.to_string(),
            pattern: pattern.into(),
            bundle,
            unique_file_names: true,
            not_cacheable_reason: None,
        }
    }

    /// Key by content hash: the file names alone do not identify the content
    pub fn with_non_unique_file_names(mut self) -> Self {
        self.unique_file_names = false;
        self
    }

    pub fn not_cacheable_because(mut self, reason: &str) -> Self {
        self.not_cacheable_reason = Some(reason.to_string());
        self
    }
}

/// An extracted entry as recorded in the metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCacheEntry {
    pub artifact_type: String,
    pub pattern: String,
    pub cache_key: Option<String>,
}

/// Which part of the build state an extractor handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Common artifacts in Gradle User Home
    GradleHome,
    /// Configuration-cache directories of the projects that were built
    ConfigurationCache,
}

impl ExtractorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GradleHome => "gradle-home",
            Self::ConfigurationCache => "configuration-cache",
        }
    }
}

/// Saves and restores the extracted entries of one [`ExtractorKind`]
pub struct EntryExtractor<'a> {
    kind: ExtractorKind,
    gradle_user_home: &'a Path,
    config: &'a CacheConfig,
    key_prefix: &'a str,
    build_results: &'a [BuildResult],
}

impl<'a> EntryExtractor<'a> {
    pub fn new(
        kind: ExtractorKind,
        gradle_user_home: &'a Path,
        config: &'a CacheConfig,
        key_prefix: &'a str,
    ) -> Self {
        Self {
            kind,
            gradle_user_home,
            config,
            key_prefix,
            build_results: &[],
        }
    }

    /// Build results used to find configuration-cache directories
    pub fn with_build_results(mut self, build_results: &'a [BuildResult]) -> Self {
        self.build_results = build_results;
        self
    }

    fn metadata_file(&self) -> PathBuf {
        self.gradle_user_home
            .join(ACTION_METADATA_DIR)
            .join(format!("{}.json", self.kind.name()))
    }

    /// Definitions of the entries this extractor saves
    pub fn definitions(&self) -> Vec<ExtractedCacheEntryDefinition> {
        match self.kind {
            ExtractorKind::GradleHome => self.gradle_home_definitions(),
            ExtractorKind::ConfigurationCache => self.configuration_cache_definitions(),
        }
    }

    fn gradle_home_definitions(&self) -> Vec<ExtractedCacheEntryDefinition> {
        let definition = |artifact_type: &str, patterns: &[&str], bundle: bool| {
            let resolved = patterns
                .iter()
                .map(|p| resolve_pattern(self.gradle_user_home, p))
                .collect::<Vec<_>>()
                .join("\n");
            ExtractedCacheEntryDefinition::new(artifact_type, resolved, bundle)
        };

        vec![
            definition(
                "generated-gradle-jars",
                &["caches/*/generated-gradle-jars/*.jar"],
                false,
            ),
            // One entry per wrapper distribution and per JDK
            definition("wrapper-zips", &["wrapper/dists/*/*/"], false),
            definition("java-toolchains", &["jdks/*/"], false),
            definition("dependencies", &["caches/modules-*/files-*/*/*/*/*"], true),
            definition("instrumented-jars", &["caches/jars-*/*"], true),
            definition("kotlin-dsl", &["caches/*/kotlin-dsl/*/*"], true),
            definition(
                "transforms",
                &["caches/transforms-4/*/", "caches/*/transforms/*/"],
                false,
            )
            .with_non_unique_file_names(),
            definition("groovy-dsl", &["caches/*/groovy-dsl/*/"], false)
                .with_non_unique_file_names(),
        ]
    }

    fn configuration_cache_definitions(&self) -> Vec<ExtractedCacheEntryDefinition> {
        let mut by_dir: BTreeMap<PathBuf, Vec<&BuildResult>> = BTreeMap::new();
        for result in self.build_results {
            let dir = result
                .root_project_dir
                .join(".gradle")
                .join("configuration-cache");
            if dir.exists() {
                by_dir.entry(dir).or_default().push(result);
            }
        }

        by_dir
            .into_iter()
            .map(|(dir, results)| {
                let pattern = dir.to_string_lossy().to_string();
                let definition =
                    ExtractedCacheEntryDefinition::new("configuration-cache", pattern, true);
                if results
                    .iter()
                    .any(|r| !version_is_at_least(&r.gradle_version, CONFIG_CACHE_MIN_GRADLE))
                {
                    info!(
                        "Not saving config-cache data for {}. Configuration cache data is only saved for Gradle 8.6+",
                        dir.display()
                    );
                    definition.not_cacheable_because(CONFIG_CACHE_TOO_OLD)
                } else {
                    definition
                }
            })
            .collect()
    }

    /// Restore every entry recorded by the previous extraction.
    ///
    /// Individual failures are recorded on the listener and do not stop the
    /// other entries from being restored.
    pub async fn restore(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
    ) -> CacheResult<()> {
        if self.kind == ExtractorKind::ConfigurationCache {
            if !listener.fully_restored() {
                return self
                    .mark_not_restored(listener, "Gradle User Home was not fully restored");
            }
            if self.config.encryption_key().is_none() {
                return self.mark_not_restored(listener, "Encryption Key was not provided");
            }
        }

        let previous = self.load_metadata();
        let mut tasks = Vec::new();
        for entry in previous {
            let Some(cache_key) = entry.cache_key.clone() else {
                continue;
            };
            let mut entry_listener = listener.entry(&entry.pattern).clone();

            if self.config.skip_restore.iter().any(|t| t == &entry.artifact_type) {
                info!("Not restoring extracted cache entry for {}", entry.artifact_type);
                entry_listener.mark_requested(SKIP_RESTORE_KEY, &[]);
                listener.update(entry_listener);
                continue;
            }

            tasks.push(async move {
                let paths = pattern_paths(&entry.pattern);
                let restored =
                    restore_cache(store, &paths, &cache_key, &[], &mut entry_listener).await;
                let cache_key = match restored {
                    Some(_) => {
                        debug!(
                            "Restored {} with key {} to {}",
                            entry.artifact_type, cache_key, entry.pattern
                        );
                        Some(cache_key)
                    }
                    None => {
                        info!(
                            "Did not restore {} with key {} to {}",
                            entry.artifact_type, cache_key, entry.pattern
                        );
                        None
                    }
                };
                (
                    ExtractedCacheEntry {
                        artifact_type: entry.artifact_type,
                        pattern: entry.pattern,
                        cache_key,
                    },
                    entry_listener,
                )
            });
        }

        let mut results = Vec::new();
        for (entry, entry_listener) in join_all(tasks).await {
            listener.update(entry_listener);
            results.push(entry);
        }
        self.write_metadata(&results)
    }

    /// Save each extracted entry and remove its files from Gradle User Home
    pub async fn extract(
        &self,
        store: &dyn CacheStore,
        listener: &mut CacheListener,
    ) -> CacheResult<()> {
        if self.kind == ExtractorKind::ConfigurationCache
            && self.config.encryption_key().is_none()
        {
            let definitions = self.definitions();
            if !definitions.is_empty() {
                info!("Not saving configuration-cache state, as no encryption key was provided");
                for definition in definitions {
                    listener
                        .entry(&definition.pattern)
                        .mark_not_saved("No encryption key provided");
                }
            }
            return Ok(());
        }

        if self.kind == ExtractorKind::GradleHome {
            self.delete_wrapper_zips().await;
        }

        let definitions = self.definitions();
        debug!(
            "Extracting {} entry definitions for {}",
            definitions.len(),
            self.kind.name()
        );
        let previous = self.load_metadata();

        let mut tasks = Vec::new();
        for definition in &definitions {
            if let Some(reason) = &definition.not_cacheable_reason {
                listener.entry(&definition.pattern).mark_not_saved(reason);
                continue;
            }

            let matching = match expand_patterns(&definition.pattern) {
                Ok(matching) => matching,
                Err(e) => {
                    warn!("Failed to resolve {}: {}", definition.artifact_type, e);
                    listener
                        .entry(&definition.pattern)
                        .mark_not_saved(&e.to_string());
                    continue;
                }
            };
            if matching.is_empty() {
                debug!("No files found to cache for {}", definition.artifact_type);
                continue;
            }

            if definition.bundle {
                let entry_listener = listener.entry(&definition.pattern).clone();
                tasks.push(self.save_extracted_entry(
                    store,
                    matching,
                    definition,
                    definition.pattern.clone(),
                    &previous,
                    entry_listener,
                ));
            } else {
                for path in matching {
                    let pattern = path.to_string_lossy().to_string();
                    let entry_listener = listener.entry(&pattern).clone();
                    tasks.push(self.save_extracted_entry(
                        store,
                        vec![path],
                        definition,
                        pattern,
                        &previous,
                        entry_listener,
                    ));
                }
            }
        }

        let mut results = Vec::new();
        for (entry, entry_listener) in join_all(tasks).await {
            listener.update(entry_listener);
            results.push(entry);
        }
        self.write_metadata(&results)
    }

    async fn save_extracted_entry(
        &self,
        store: &dyn CacheStore,
        matching: Vec<PathBuf>,
        definition: &ExtractedCacheEntryDefinition,
        pattern: String,
        previous: &[ExtractedCacheEntry],
        mut entry_listener: CacheEntryListener,
    ) -> (ExtractedCacheEntry, CacheEntryListener) {
        let artifact_type = definition.artifact_type.clone();

        let cache_key = match self.cache_key(definition, &matching).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Failed to compute cache key for {}: {}", pattern, e);
                entry_listener.mark_not_saved(&e.to_string());
                None
            }
        };

        if let Some(key) = &cache_key {
            let previous_key = previous
                .iter()
                .find(|p| p.artifact_type == artifact_type && p.pattern == pattern)
                .and_then(|p| p.cache_key.as_deref());

            if previous_key == Some(key.as_str()) {
                debug!(
                    "No change to previously restored {}. Not saving.",
                    artifact_type
                );
                entry_listener.mark_not_saved("contents unchanged");
            } else {
                info!(
                    "Caching {} with path '{}' and cache key: {}",
                    artifact_type, pattern, key
                );
                save_cache(store, &pattern_paths(&pattern), key, &mut entry_listener).await;
            }
        }

        for path in &matching {
            if let Err(e) = try_delete(path).await {
                warn!("{}", e);
            }
        }

        (
            ExtractedCacheEntry {
                artifact_type,
                pattern,
                cache_key,
            },
            entry_listener,
        )
    }

    async fn cache_key(
        &self,
        definition: &ExtractedCacheEntryDefinition,
        matching: &[PathBuf],
    ) -> CacheResult<String> {
        let hash = if definition.unique_file_names {
            let relative: Vec<&Path> = matching
                .iter()
                .map(|p| p.strip_prefix(self.gradle_user_home).unwrap_or(p))
                .collect();
            hash_file_names(&relative)
        } else {
            let root = self.gradle_user_home.to_path_buf();
            let paths = matching.to_vec();
            tokio::task::spawn_blocking(move || hash_files(&root, &paths))
                .await
                .map_err(|e| CacheError::Internal(format!("hash task failed: {}", e)))??
                .ok_or_else(|| CacheError::Internal("no files to hash".to_string()))?
        };

        Ok(format!(
            "{}{}-{}",
            self.key_prefix,
            cache_key_base(&definition.artifact_type, CACHE_PROTOCOL_VERSION),
            hash
        ))
    }

    /// Wrapper zips are never needed once the distribution is unpacked
    async fn delete_wrapper_zips(&self) {
        let pattern = resolve_pattern(self.gradle_user_home, "wrapper/dists/*/*/*.zip");
        match expand_patterns(&pattern) {
            Ok(zips) => {
                for zip in zips {
                    if let Err(e) = try_delete(&zip).await {
                        warn!("{}", e);
                    }
                }
            }
            Err(e) => warn!("Failed to find wrapper zips: {}", e),
        }
    }

    fn mark_not_restored(&self, listener: &mut CacheListener, reason: &str) -> CacheResult<()> {
        let previous = self.load_metadata();
        if previous.is_empty() {
            return Ok(());
        }
        info!("Not restoring {} state, as {}", self.kind.name(), reason);
        for entry in &previous {
            listener
                .entry(&entry.pattern)
                .mark_not_restored(reason)
                .mark_not_saved(reason);
        }
        self.write_metadata(&[])
    }

    /// Entries recorded by the previous extraction; unreadable metadata is empty
    pub fn load_metadata(&self) -> Vec<ExtractedCacheEntry> {
        let path = self.metadata_file();
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable metadata {}: {}", path.display(), e);
            Vec::new()
        })
    }

    fn write_metadata(&self, entries: &[ExtractedCacheEntry]) -> CacheResult<()> {
        let path = self.metadata_file();
        debug!("Saving {} metadata to {}", self.kind.name(), path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
        }
        std::fs::write(&path, serde_json::to_string(entries)?)
            .map_err(|e| CacheError::io(format!("writing {}", path.display()), e))
    }
}

fn resolve_pattern(root: &Path, pattern: &str) -> String {
    let trailing = pattern.ends_with('/');
    let mut resolved = root
        .join(pattern.trim_end_matches('/'))
        .to_string_lossy()
        .to_string();
    if trailing {
        resolved.push('/');
    }
    resolved
}

fn pattern_paths(pattern: &str) -> Vec<String> {
    pattern
        .lines()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
