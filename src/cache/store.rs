//! Cache store abstraction
//!
//! The engine only talks to a store through [`CacheStore`]. Store failures
//! never abort the lifecycle: the helpers below turn them into listener
//! outcomes and warnings.

use crate::cache::report::CacheEntryListener;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

/// An entry found in, or written to, the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    /// Key of the entry actually matched or written
    pub key: String,
    /// Archive size in bytes
    pub size: u64,
}

/// Key/value blob cache with prefix fallback on restore
///
/// Paths are absolute and may contain glob patterns; a leading `!` excludes
/// matching paths from a save.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Whether the store can be used in this environment
    fn is_available(&self) -> bool;

    /// Restore the entry for `primary_key`, falling back to the newest entry
    /// whose key starts with one of `restore_keys`, in order
    async fn restore(
        &self,
        paths: &[String],
        primary_key: &str,
        restore_keys: &[String],
    ) -> CacheResult<Option<CacheHit>>;

    /// Save `paths` under `key`.
    ///
    /// Fails with [`CacheError::EntryAlreadyExists`] if the key is taken.
    async fn save(&self, paths: &[String], key: &str) -> CacheResult<CacheHit>;
}

/// Format bytes as human-readable size (e.g., "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Restore an entry and record the outcome on `listener`.
///
/// Store errors are logged and treated as a miss.
pub async fn restore_cache(
    store: &dyn CacheStore,
    paths: &[String],
    key: &str,
    restore_keys: &[String],
    listener: &mut CacheEntryListener,
) -> Option<CacheHit> {
    listener.mark_requested(key, restore_keys);
    let start = Instant::now();

    match store.restore(paths, key, restore_keys).await {
        Ok(Some(hit)) => {
            info!(
                "Restored {} with key {} ({})",
                listener.entry_name,
                hit.key,
                format_bytes(hit.size)
            );
            listener.mark_restored(&hit.key, Some(hit.size), elapsed_ms(start));
            Some(hit)
        }
        Ok(None) => {
            info!(
                "No cache entry found for {} with key {}",
                listener.entry_name, key
            );
            None
        }
        Err(e) => {
            warn!("Failed to restore {}: {}", listener.entry_name, e);
            listener.mark_not_restored(&e.to_string());
            None
        }
    }
}

/// Save an entry and record the outcome on `listener`.
///
/// An existing entry under the same key is expected when jobs race and is
/// recorded as saved with size 0. Other errors are logged.
pub async fn save_cache(
    store: &dyn CacheStore,
    paths: &[String],
    key: &str,
    listener: &mut CacheEntryListener,
) {
    let start = Instant::now();

    match store.save(paths, key).await {
        Ok(hit) => {
            info!(
                "Saved {} with key {} ({})",
                listener.entry_name,
                hit.key,
                format_bytes(hit.size)
            );
            listener.mark_saved(&hit.key, Some(hit.size), elapsed_ms(start));
        }
        Err(CacheError::EntryAlreadyExists(existing)) => {
            info!("Cache entry {} already exists, not saving", existing);
            listener.mark_already_exists(key);
        }
        Err(e) => {
            warn!("Failed to save {}: {}", listener.entry_name, e);
            listener.mark_not_saved(&e.to_string());
        }
    }
}
