//! Directory-backed cache store
//!
//! Entries live in a single directory, typically on a volume shared between
//! runners:
//!
//! ```text
//! <dir>/<sha256(key, version)>.tar.gz   archived paths
//! <dir>/<sha256(key, version)>.json     {key, version, size, created_at}
//! ```
//!
//! Archive entry names are the absolute source paths with the root removed,
//! so restoring recreates every file at its original location. The version is
//! a digest of the requested path set: an entry is only visible to requests
//! for exactly the paths it was saved from.

use crate::cache::files::MATCH_OPTIONS;
use crate::cache::hash::hash_strings;
use crate::cache::store::{CacheHit, CacheStore};
use crate::config::schema::StoreConfig;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Sidecar describing an archived entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMetadata {
    key: String,
    #[serde(default)]
    version: String,
    size: u64,
    created_at: DateTime<Utc>,
}

/// Cache store keeping archives in a local or mounted directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: Option<PathBuf>,
    unpack_root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `dir`; `None` makes it unavailable
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            unpack_root: PathBuf::from(std::path::MAIN_SEPARATOR_STR),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.dir.clone())
    }

    fn dir(&self) -> CacheResult<&Path> {
        self.dir.as_deref().ok_or_else(|| {
            CacheError::StoreUnavailable("no store directory configured".to_string())
        })
    }

    fn entry_stem(key: &str, version: &str) -> String {
        hash_strings([key, version])
    }
}

/// Digest identifying the path set an entry was saved from
fn paths_version(paths: &[String]) -> String {
    hash_strings(paths)
}

#[async_trait]
impl CacheStore for DirectoryStore {
    fn is_available(&self) -> bool {
        self.dir.is_some()
    }

    async fn restore(
        &self,
        paths: &[String],
        primary_key: &str,
        restore_keys: &[String],
    ) -> CacheResult<Option<CacheHit>> {
        let dir = self.dir()?.to_path_buf();
        let version = paths_version(paths);
        let unpack_root = self.unpack_root.clone();
        let primary_key = primary_key.to_string();
        let restore_keys = restore_keys.to_vec();

        tokio::task::spawn_blocking(move || {
            let entries = read_entries(&dir, &version)?;
            let Some(entry) = find_entry(&entries, &primary_key, &restore_keys) else {
                return Ok(None);
            };

            let stem = DirectoryStore::entry_stem(&entry.key, &entry.version);
            let archive = dir.join(format!("{}.tar.gz", stem));
            debug!("Unpacking {} from {}", entry.key, archive.display());
            unpack_archive(&archive, &unpack_root)?;

            Ok(Some(CacheHit {
                key: entry.key.clone(),
                size: entry.size,
            }))
        })
        .await
        .map_err(|e| CacheError::Internal(format!("restore task failed: {}", e)))?
    }

    async fn save(&self, paths: &[String], key: &str) -> CacheResult<CacheHit> {
        let dir = self.dir()?.to_path_buf();
        let version = paths_version(paths);
        let paths = paths.to_vec();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let stem = DirectoryStore::entry_stem(&key, &version);
            let metadata_path = dir.join(format!("{}.json", stem));
            if metadata_path.exists() {
                return Err(CacheError::EntryAlreadyExists(key));
            }

            let entries = resolve_paths(&paths)?;
            if entries.is_empty() {
                return Err(CacheError::store(
                    &key,
                    "path(s) specified for caching do not exist, no cache is being saved",
                ));
            }

            fs::create_dir_all(&dir).map_err(|e| {
                CacheError::io(format!("creating store directory {}", dir.display()), e)
            })?;

            let suffix = Uuid::new_v4();
            let archive_tmp = dir.join(format!("{}.tar.gz.{}.tmp", stem, suffix));
            let archive_path = dir.join(format!("{}.tar.gz", stem));
            write_archive(&entries, &archive_tmp)?;

            let size = fs::metadata(&archive_tmp)
                .map_err(|e| CacheError::io("reading archive size", e))?
                .len();

            // Another job may have finished the same key while we were archiving
            if metadata_path.exists() {
                if let Err(e) = fs::remove_file(&archive_tmp) {
                    debug!("Failed to remove {}: {}", archive_tmp.display(), e);
                }
                return Err(CacheError::EntryAlreadyExists(key));
            }

            fs::rename(&archive_tmp, &archive_path).map_err(|e| {
                CacheError::io(format!("publishing {}", archive_path.display()), e)
            })?;

            let metadata = EntryMetadata {
                key: key.clone(),
                version,
                size,
                created_at: Utc::now(),
            };
            let metadata_tmp = dir.join(format!("{}.json.{}.tmp", stem, suffix));
            fs::write(&metadata_tmp, serde_json::to_string_pretty(&metadata)?)
                .map_err(|e| CacheError::io("writing entry metadata", e))?;
            fs::rename(&metadata_tmp, &metadata_path).map_err(|e| {
                CacheError::io(format!("publishing {}", metadata_path.display()), e)
            })?;

            Ok(CacheHit { key, size })
        })
        .await
        .map_err(|e| CacheError::Internal(format!("save task failed: {}", e)))?
    }
}

/// Entries saved from the path set identified by `version`
fn read_entries(dir: &Path, version: &str) -> CacheResult<Vec<EntryMetadata>> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CacheError::io(
                format!("reading store directory {}", dir.display()),
                e,
            ))
        }
    };

    let mut entries = Vec::new();
    for item in listing {
        let path = item
            .map_err(|e| CacheError::io("reading store directory entry", e))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<EntryMetadata>(&raw).ok());
        match parsed {
            Some(entry) if entry.version == version => entries.push(entry),
            Some(entry) => debug!("Skipping {} saved from other paths", entry.key),
            None => debug!("Ignoring unreadable entry metadata {}", path.display()),
        }
    }
    Ok(entries)
}

/// Exact key first, then the newest entry for each restore key prefix in turn
fn find_entry<'a>(
    entries: &'a [EntryMetadata],
    primary_key: &str,
    restore_keys: &[String],
) -> Option<&'a EntryMetadata> {
    if let Some(exact) = entries.iter().find(|e| e.key == primary_key) {
        return Some(exact);
    }
    restore_keys.iter().find_map(|prefix| {
        entries
            .iter()
            .filter(|e| e.key.starts_with(prefix.as_str()))
            .max_by_key(|e| e.created_at)
    })
}

/// Expand include globs and drop anything matching a `!` pattern
fn resolve_paths(paths: &[String]) -> CacheResult<Vec<PathBuf>> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for raw in paths {
        let (negated, pattern) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let pattern = pattern.trim_end_matches(['/', '\\']);
        if pattern.is_empty() {
            continue;
        }
        if negated {
            excludes.push(Pattern::new(pattern).map_err(|e| invalid_pattern(raw, e))?);
        } else {
            includes.push((pattern, raw));
        }
    }

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for (pattern, raw) in includes {
        let matches =
            glob::glob_with(pattern, MATCH_OPTIONS).map_err(|e| invalid_pattern(raw, e))?;
        for path in matches.filter_map(Result::ok) {
            walk(&path, &excludes, &mut seen, &mut found)?;
        }
    }
    Ok(found)
}

fn invalid_pattern(raw: &str, e: glob::PatternError) -> CacheError {
    CacheError::InvalidInput {
        name: "cache path".to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    }
}

fn walk(
    path: &Path,
    excludes: &[Pattern],
    seen: &mut HashSet<PathBuf>,
    found: &mut Vec<PathBuf>,
) -> CacheResult<()> {
    if excludes.iter().any(|p| p.matches_path_with(path, MATCH_OPTIONS)) {
        return Ok(());
    }
    if !seen.insert(path.to_path_buf()) {
        return Ok(());
    }
    let metadata = fs::symlink_metadata(path)
        .map_err(|e| CacheError::io(format!("reading {}", path.display()), e))?;
    found.push(path.to_path_buf());

    if metadata.is_dir() {
        let mut children = fs::read_dir(path)
            .map_err(|e| CacheError::io(format!("reading directory {}", path.display()), e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect::<Vec<_>>();
        children.sort();
        for child in children {
            walk(&child, excludes, seen, found)?;
        }
    }
    Ok(())
}

fn archive_name(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn write_archive(entries: &[PathBuf], dest: &Path) -> CacheResult<()> {
    let archive_err = |e: std::io::Error| CacheError::Archive {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::create(dest).map_err(archive_err)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for path in entries {
        let name = archive_name(path);
        let is_dir = fs::symlink_metadata(path)
            .map(|m| m.is_dir())
            .map_err(archive_err)?;
        if is_dir {
            builder.append_dir(&name, path).map_err(archive_err)?;
        } else {
            builder.append_path_with_name(path, &name).map_err(archive_err)?;
        }
    }

    builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(archive_err)?;
    Ok(())
}

fn unpack_archive(archive: &Path, dest: &Path) -> CacheResult<()> {
    let archive_err = |e: std::io::Error| CacheError::Archive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    };

    let file = File::open(archive).map_err(archive_err)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_mtime(true);
    tar.set_overwrite(true);
    tar.unpack(dest).map_err(archive_err)
}
