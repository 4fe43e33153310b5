//! Content hashing for cache key fingerprints

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hash a sequence of strings into a hex digest.
///
/// Values are length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_strings<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for value in values {
        let value = value.as_ref();
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash file names, normalising separators so keys match across platforms
pub fn hash_file_names<P: AsRef<Path>>(names: &[P]) -> String {
    hash_strings(names.iter().map(|p| normalize_separators(p.as_ref())))
}

/// Hash the contents of a set of files and directories.
///
/// Directories are walked recursively. Files are visited in sorted order of
/// their path relative to `root`, and both the relative path and the content
/// contribute to the digest. Returns `None` when no file was found.
pub fn hash_files(root: &Path, paths: &[PathBuf]) -> CacheResult<Option<String>> {
    let mut files = Vec::new();
    for path in paths {
        collect_files(path, &mut files)?;
    }
    if files.is_empty() {
        return Ok(None);
    }
    files.sort();
    files.dedup();

    let mut hasher = Sha256::new();
    for file in &files {
        let relative = file.strip_prefix(root).unwrap_or(file);
        let contents = std::fs::read(file)
            .map_err(|e| CacheError::io(format!("reading {}", file.display()), e))?;
        let digest = Sha256::digest(&contents);
        hasher.update(normalize_separators(relative).as_bytes());
        hasher.update(digest);
    }
    Ok(Some(hex::encode(hasher.finalize())))
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> CacheResult<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };
    if metadata.is_dir() {
        let entries = std::fs::read_dir(path)
            .map_err(|e| CacheError::io(format!("reading directory {}", path.display()), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io("reading directory entry", e))?;
            collect_files(&entry.path(), files)?;
        }
    } else if metadata.is_file() {
        files.push(path.to_path_buf());
    }
    Ok(())
}

fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
