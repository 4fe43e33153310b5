//! Filesystem helpers shared by the Gradle User Home cache and extractors

use crate::error::{CacheError, CacheResult};
use glob::MatchOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const DELETE_ATTEMPTS: u32 = 5;
const DELETE_RETRY_DELAY: Duration = Duration::from_secs(1);

pub(crate) const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Expand one glob pattern into matching paths, sorted.
///
/// A trailing separator restricts matches to directories.
pub fn expand_glob(pattern: &str) -> CacheResult<Vec<PathBuf>> {
    let dirs_only = pattern.ends_with('/') || pattern.ends_with('\\');
    let trimmed = pattern.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let matches = glob::glob_with(trimmed, MATCH_OPTIONS).map_err(|e| CacheError::InvalidInput {
        name: "cache path".to_string(),
        value: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut found: Vec<PathBuf> = matches
        .filter_map(Result::ok)
        .filter(|p| !dirs_only || p.is_dir())
        .collect();
    found.sort();
    Ok(found)
}

/// Expand several newline-separated patterns
pub fn expand_patterns(patterns: &str) -> CacheResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for pattern in patterns.lines().map(str::trim).filter(|p| !p.is_empty()) {
        found.extend(expand_glob(pattern)?);
    }
    found.sort();
    found.dedup();
    Ok(found)
}

/// Delete a file or directory, retrying while another process holds a lock
pub async fn try_delete(path: &Path) -> CacheResult<()> {
    for attempt in 1..=DELETE_ATTEMPTS {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt == DELETE_ATTEMPTS => {
                warn!(
                    "Failed to delete {}, which will impact caching. It is likely locked by another process.",
                    path.display()
                );
                return Err(CacheError::io(format!("deleting {}", path.display()), e));
            }
            Err(e) => {
                debug!(
                    "Attempt {} to delete {} failed: {}. Will try again.",
                    attempt,
                    path.display(),
                    e
                );
                tokio::time::sleep(DELETE_RETRY_DELAY).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn trailing_separator_matches_directories_only() {
        let temp = TempDir::new().unwrap();
        let dists = temp.path().join("wrapper/dists/gradle-8.11-bin");
        fs::create_dir_all(dists.join("abc")).unwrap();
        fs::write(dists.join("note.txt"), b"").unwrap();

        let base = temp.path().to_string_lossy();
        let dirs = expand_glob(&format!("{}/wrapper/dists/*/*/", base)).unwrap();
        assert_eq!(dirs, vec![dists.join("abc")]);

        let all = expand_glob(&format!("{}/wrapper/dists/*/*", base)).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn star_does_not_cross_separators() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("caches/jars-9/a/b")).unwrap();

        let pattern = format!("{}/caches/jars-*/*", temp.path().to_string_lossy());
        let found = expand_glob(&pattern).unwrap();
        assert_eq!(found, vec![temp.path().join("caches/jars-9/a")]);
    }

    #[tokio::test]
    async fn try_delete_handles_files_dirs_and_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        fs::create_dir_all(dir.join("nested")).unwrap();
        let file = temp.path().join("file.zip");
        fs::write(&file, b"zip").unwrap();

        try_delete(&dir).await.unwrap();
        try_delete(&file).await.unwrap();
        try_delete(&temp.path().join("missing")).await.unwrap();

        assert!(!dir.exists());
        assert!(!file.exists());
    }
}
