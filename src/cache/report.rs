//! Cache reporting
//!
//! Collects what was restored and saved for each cache entry during the job.
//! The listener is serialized into the job state at the end of the restore
//! phase and rehydrated by the save phase, which runs in another process.

use crate::error::CacheResult;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

pub const DEFAULT_CACHE_ENABLED_REASON: &str =
    "Cache was enabled. Gradle User Home was restored from and saved to the cache.";

pub const DEFAULT_READONLY_REASON: &str =
    "Cache was read-only. Gradle User Home was restored but not saved.";

pub const DEFAULT_DISABLED_REASON: &str =
    "Cache was disabled via configuration. Gradle User Home was not restored from or saved to the cache.";

pub const DEFAULT_WRITEONLY_REASON: &str =
    "Cache was set to write-only via configuration. Gradle User Home was not restored from cache.";

pub const DEFAULT_UNAVAILABLE_REASON: &str =
    "Cache store was not available. Gradle User Home was not restored from or saved to the cache.";

pub const EXISTING_GRADLE_HOME: &str =
    "Cache was disabled to avoid overwriting a pre-existing Gradle User Home. Gradle User Home was not restored from or saved to the cache.";

pub const CLEANUP_DISABLED_READONLY: &str =
    "Cache cleanup is always disabled when cache is read-only or disabled.";

pub const DEFAULT_CLEANUP_ENABLED_REASON: &str =
    "Cache cleanup was enabled. Stale files in Gradle User Home were purged before saving to the cache.";

pub const DEFAULT_CLEANUP_DISABLED_REASON: &str =
    "Cache cleanup was disabled via configuration. No cleanup of Gradle User Home was performed.";

pub const CLEANUP_DISABLED_DUE_TO_FAILURE: &str =
    "Cache cleanup was disabled due to build failure. Use `cache-cleanup: always` to override this behavior.";

pub const CLEANUP_DISABLED_DUE_TO_CONFIG_CACHE_HIT: &str =
    "Cache cleanup was disabled due to configuration-cache reuse. This is expected.";

/// Collects information on what entries were saved and restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheListener {
    pub cache_entries: Vec<CacheEntryListener>,
    pub cache_read_only: bool,
    pub cache_write_only: bool,
    pub cache_disabled: bool,
    pub cache_unavailable: bool,
    pub cache_status_reason: String,
    pub cache_cleanup_message: String,
}

impl Default for CacheListener {
    fn default() -> Self {
        Self {
            cache_entries: Vec::new(),
            cache_read_only: false,
            cache_write_only: false,
            cache_disabled: false,
            cache_unavailable: false,
            cache_status_reason: DEFAULT_CACHE_ENABLED_REASON.to_string(),
            cache_cleanup_message: DEFAULT_CLEANUP_DISABLED_REASON.to_string(),
        }
    }
}

impl CacheListener {
    /// Create an empty listener
    pub fn new() -> Self {
        Self::default()
    }

    /// No entry was requested without being restored
    pub fn fully_restored(&self) -> bool {
        self.cache_entries
            .iter()
            .all(|e| !e.was_requested_but_not_restored())
    }

    /// One-word cache status for the report headline
    pub fn cache_status(&self) -> &'static str {
        if self.cache_unavailable {
            "not available"
        } else if self.cache_disabled {
            "disabled"
        } else if self.cache_write_only {
            "write-only"
        } else if self.cache_read_only {
            "read-only"
        } else {
            "enabled"
        }
    }

    pub fn set_read_only(&mut self) {
        self.cache_read_only = true;
        self.cache_status_reason = DEFAULT_READONLY_REASON.to_string();
        self.cache_cleanup_message = CLEANUP_DISABLED_READONLY.to_string();
    }

    pub fn set_disabled(&mut self, reason: &str) {
        self.cache_disabled = true;
        self.cache_status_reason = reason.to_string();
        self.cache_cleanup_message = CLEANUP_DISABLED_READONLY.to_string();
    }

    pub fn set_unavailable(&mut self) {
        self.cache_unavailable = true;
        self.set_disabled(DEFAULT_UNAVAILABLE_REASON);
    }

    pub fn set_write_only(&mut self) {
        self.cache_write_only = true;
        self.cache_status_reason = DEFAULT_WRITEONLY_REASON.to_string();
    }

    pub fn set_cleanup_enabled(&mut self) {
        self.cache_cleanup_message = DEFAULT_CLEANUP_ENABLED_REASON.to_string();
    }

    pub fn set_cleanup_disabled(&mut self, reason: &str) {
        self.cache_cleanup_message = reason.to_string();
    }

    /// Get the entry with this name, creating it on first reference
    pub fn entry(&mut self, name: &str) -> &mut CacheEntryListener {
        let index = match self.cache_entries.iter().position(|e| e.entry_name == name) {
            Some(index) => index,
            None => {
                self.cache_entries.push(CacheEntryListener::new(name));
                self.cache_entries.len() - 1
            }
        };
        &mut self.cache_entries[index]
    }

    /// Look up an entry without creating it
    pub fn get(&self, name: &str) -> Option<&CacheEntryListener> {
        self.cache_entries.iter().find(|e| e.entry_name == name)
    }

    /// Store an entry that was updated out of line, replacing any with the same name
    pub fn update(&mut self, entry: CacheEntryListener) {
        let name = entry.entry_name.clone();
        *self.entry(&name) = entry;
    }

    /// Take the entries `updated` changed relative to `baseline`.
    ///
    /// Used to combine listeners that were updated concurrently from the same
    /// starting point.
    pub fn merge_changes(&mut self, baseline: &CacheListener, updated: CacheListener) {
        for entry in updated.cache_entries {
            if baseline.get(&entry.entry_name) != Some(&entry) {
                self.update(entry);
            }
        }
    }

    /// Serialize for the job state
    pub fn stringify(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuild a listener serialized by [`CacheListener::stringify`]
    pub fn rehydrate(raw: &str) -> CacheResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Human-readable summary of the cache activity
    pub fn generate_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Caching for Gradle was {}", self.cache_status());
        let _ = writeln!(out, "- {}", self.cache_status_reason);
        let _ = writeln!(out, "- {}", self.cache_cleanup_message);
        out.push('\n');
        out.push_str(&render_entry_table(&self.cache_entries));
        out.push('\n');
        out.push_str("Cache Entry Details\n");
        out.push_str(&render_entry_details(self));
        out
    }
}

/// Collects information on the state of a single cache entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheEntryListener {
    pub entry_name: String,
    pub requested_key: Option<String>,
    pub requested_restore_keys: Option<Vec<String>>,
    pub restored_key: Option<String>,
    pub restored_size: Option<u64>,
    pub restored_time: Option<u64>,
    pub not_restored: Option<String>,
    pub saved_key: Option<String>,
    pub saved_size: Option<u64>,
    pub saved_time: Option<u64>,
    pub not_saved: Option<String>,
}

impl CacheEntryListener {
    pub fn new(name: &str) -> Self {
        Self {
            entry_name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn was_requested_but_not_restored(&self) -> bool {
        self.requested_key.is_some() && self.restored_key.is_none()
    }

    fn restore_recorded(&self) -> bool {
        self.restored_key.is_some() || self.not_restored.is_some()
    }

    fn save_recorded(&self) -> bool {
        self.saved_key.is_some() || self.not_saved.is_some()
    }

    pub fn mark_requested(&mut self, key: &str, restore_keys: &[String]) -> &mut Self {
        self.requested_key = Some(key.to_string());
        self.requested_restore_keys = Some(restore_keys.to_vec());
        self
    }

    pub fn mark_restored(&mut self, key: &str, size: Option<u64>, time_ms: u64) -> &mut Self {
        if self.restore_recorded() {
            debug!("Restore outcome for {} already recorded", self.entry_name);
            return self;
        }
        self.restored_key = Some(key.to_string());
        self.restored_size = size;
        self.restored_time = Some(time_ms);
        self
    }

    pub fn mark_not_restored(&mut self, message: &str) -> &mut Self {
        if self.restore_recorded() {
            debug!("Restore outcome for {} already recorded", self.entry_name);
            return self;
        }
        self.not_restored = Some(message.to_string());
        self
    }

    pub fn mark_saved(&mut self, key: &str, size: Option<u64>, time_ms: u64) -> &mut Self {
        if self.save_recorded() {
            debug!("Save outcome for {} already recorded", self.entry_name);
            return self;
        }
        self.saved_key = Some(key.to_string());
        self.saved_size = size;
        self.saved_time = Some(time_ms);
        self
    }

    pub fn mark_already_exists(&mut self, key: &str) -> &mut Self {
        if self.save_recorded() {
            debug!("Save outcome for {} already recorded", self.entry_name);
            return self;
        }
        self.saved_key = Some(key.to_string());
        self.saved_size = Some(0);
        self
    }

    pub fn mark_not_saved(&mut self, message: &str) -> &mut Self {
        if self.save_recorded() {
            debug!("Save outcome for {} already recorded", self.entry_name);
            return self;
        }
        self.not_saved = Some(message.to_string());
        self
    }
}

fn render_entry_table(entries: &[CacheEntryListener]) -> String {
    let restored = Totals::of(entries, |e| (e.restored_size, e.restored_time));
    let saved = Totals::of(entries, |e| (e.saved_size, e.saved_time));

    format!(
        "{:<18} {:>6} {:>16} {:>16}\n{:<18} {:>6} {:>16} {:>16}\n{:<18} {:>6} {:>16} {:>16}\n",
        "",
        "Count",
        "Total Size (MB)",
        "Total Time (ms)",
        "Entries Restored",
        restored.count,
        restored.size_mb,
        restored.time_ms,
        "Entries Saved",
        saved.count,
        saved.size_mb,
        saved.time_ms,
    )
}

struct Totals {
    count: usize,
    size_mb: u64,
    time_ms: u64,
}

impl Totals {
    fn of<F>(entries: &[CacheEntryListener], pick: F) -> Self
    where
        F: Fn(&CacheEntryListener) -> (Option<u64>, Option<u64>),
    {
        let mut count = 0;
        let mut bytes = 0;
        let mut time_ms = 0;
        for entry in entries {
            let (size, time) = pick(entry);
            if size.is_some_and(|s| s > 0) {
                count += 1;
            }
            bytes += size.unwrap_or(0);
            time_ms += time.unwrap_or(0);
        }
        Self {
            count,
            size_mb: to_mb(bytes),
            time_ms,
        }
    }
}

fn render_entry_details(listener: &CacheListener) -> String {
    listener
        .cache_entries
        .iter()
        .map(|entry| {
            format!(
                "Entry: {}\n    Requested Key : {}\n    Restored  Key : {}\n              Size: {}\n              Time: {}\n              {}\n    Saved     Key : {}\n              Size: {}\n              Time: {}\n              {}\n",
                entry.entry_name,
                entry.requested_key.as_deref().unwrap_or(""),
                entry.restored_key.as_deref().unwrap_or(""),
                format_size(entry.restored_size),
                format_time(entry.restored_time),
                restored_message(entry, listener.cache_write_only),
                entry.saved_key.as_deref().unwrap_or(""),
                format_size(entry.saved_size),
                format_time(entry.saved_time),
                saved_message(entry, listener.cache_read_only),
            )
        })
        .collect::<Vec<_>>()
        .join("---\n")
}

fn restored_message(entry: &CacheEntryListener, cache_write_only: bool) -> String {
    if let Some(reason) = &entry.not_restored {
        return format!("(Entry not restored: {})", reason);
    }
    if cache_write_only {
        return "(Entry not restored: cache is write-only)".to_string();
    }
    match (&entry.requested_key, &entry.restored_key) {
        (None, _) => "(Entry not restored: not requested)".to_string(),
        (Some(_), None) => "(Entry not restored: no match found)".to_string(),
        (Some(requested), Some(restored)) if requested == restored => {
            "(Entry restored: exact match found)".to_string()
        }
        _ => "(Entry restored: partial match found)".to_string(),
    }
}

fn saved_message(entry: &CacheEntryListener, cache_read_only: bool) -> String {
    if let Some(reason) = &entry.not_saved {
        return format!("(Entry not saved: {})", reason);
    }
    if entry.saved_key.is_none() {
        if cache_read_only {
            return "(Entry not saved: cache is read-only)".to_string();
        }
        if entry.not_restored.is_some() {
            return "(Entry not saved: not restored)".to_string();
        }
        return "(Entry not saved: reason unknown)".to_string();
    }
    if entry.saved_size == Some(0) {
        return "(Entry not saved: entry with key already exists)".to_string();
    }
    "(Entry saved)".to_string()
}

fn to_mb(bytes: u64) -> u64 {
    (bytes as f64 / (1024.0 * 1024.0)).round() as u64
}

fn format_size(bytes: Option<u64>) -> String {
    match bytes {
        None | Some(0) => String::new(),
        Some(b) => format!("{} MB ({} B)", to_mb(b), b),
    }
}

fn format_time(ms: Option<u64>) -> String {
    match ms {
        None | Some(0) => String::new(),
        Some(ms) => format!("{} ms", ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> CacheListener {
        let mut listener = CacheListener::new();
        listener
            .entry("Gradle User Home")
            .mark_requested(
                "gradle-home-v1|Linux|build[abc]-sha",
                &["gradle-home-v1|Linux".to_string()],
            )
            .mark_restored(
                "gradle-home-v1|Linux|build[abc]-old",
                Some(5 * 1024 * 1024),
                120,
            )
            .mark_saved(
                "gradle-home-v1|Linux|build[abc]-sha",
                Some(6 * 1024 * 1024),
                300,
            );
        listener
            .entry("/home/.gradle/wrapper/dists/gradle-8.11-bin/abc")
            .mark_requested("gradle-wrapper-zips-v1-123", &[])
            .mark_not_restored("network unreachable");
        listener
    }

    #[test]
    fn merge_changes_keeps_both_sides() {
        let baseline = populated();
        let mut left = baseline.clone();
        left.entry("/home/.gradle/jdks/17")
            .mark_saved("gradle-java-toolchains-v1-1", Some(1), 1);
        let mut right = baseline.clone();
        right
            .entry("/work/.gradle/configuration-cache")
            .mark_not_saved("No encryption key provided");

        let mut merged = baseline.clone();
        merged.merge_changes(&baseline, left);
        merged.merge_changes(&baseline, right);

        assert_eq!(merged.cache_entries.len(), 4);
        assert!(merged
            .get("/home/.gradle/jdks/17")
            .unwrap()
            .saved_key
            .is_some());
        assert!(merged
            .get("/work/.gradle/configuration-cache")
            .unwrap()
            .not_saved
            .is_some());
        assert_eq!(
            merged.get("Gradle User Home"),
            baseline.get("Gradle User Home")
        );
    }

    #[test]
    fn entry_is_get_or_create() {
        let mut listener = CacheListener::new();
        listener.entry("a").mark_requested("k", &[]);
        listener.entry("a");
        listener.entry("b");

        assert_eq!(listener.cache_entries.len(), 2);
        assert_eq!(listener.get("a").unwrap().requested_key.as_deref(), Some("k"));
    }

    #[test]
    fn stringify_rehydrate_roundtrip() {
        let mut listener = populated();
        listener.set_read_only();

        let rehydrated = CacheListener::rehydrate(&listener.stringify().unwrap()).unwrap();
        assert_eq!(rehydrated, listener);
    }

    #[test]
    fn rehydrate_empty_is_default() {
        assert_eq!(CacheListener::rehydrate("").unwrap(), CacheListener::default());
    }

    #[test]
    fn already_exists_records_zero_size() {
        let mut listener = CacheListener::new();
        listener.entry("home").mark_already_exists("K");

        let entry = listener.get("home").unwrap();
        assert_eq!(entry.saved_key.as_deref(), Some("K"));
        assert_eq!(entry.saved_size, Some(0));
        assert!(entry.not_saved.is_none());
    }

    #[test]
    fn outcomes_are_written_once() {
        let mut entry = CacheEntryListener::new("home");
        entry.mark_not_saved("cache key not changed");
        entry.mark_saved("K", Some(10), 5);
        assert_eq!(entry.saved_key, None);
        assert_eq!(entry.not_saved.as_deref(), Some("cache key not changed"));

        entry.mark_restored("K", Some(1), 1);
        entry.mark_not_restored("late");
        assert_eq!(entry.restored_key.as_deref(), Some("K"));
        assert_eq!(entry.not_restored, None);
    }

    #[test]
    fn fully_restored_tracks_requests() {
        let listener = populated();
        assert!(!listener.fully_restored());

        let mut ok = CacheListener::new();
        ok.entry("home").mark_requested("k", &[]).mark_restored("k", None, 1);
        ok.entry("never-requested");
        assert!(ok.fully_restored());
    }

    #[test]
    fn status_precedence() {
        let mut listener = CacheListener::new();
        assert_eq!(listener.cache_status(), "enabled");
        listener.set_read_only();
        assert_eq!(listener.cache_status(), "read-only");
        listener.set_write_only();
        assert_eq!(listener.cache_status(), "write-only");
        listener.set_disabled(EXISTING_GRADLE_HOME);
        assert_eq!(listener.cache_status(), "disabled");
        assert_eq!(listener.cache_status_reason, EXISTING_GRADLE_HOME);
        listener.set_unavailable();
        assert_eq!(listener.cache_status(), "not available");
    }

    #[test]
    fn report_aggregates_and_explains() {
        let report = populated().generate_report();

        assert!(report.starts_with("Caching for Gradle was enabled"));
        assert!(report.contains("(Entry restored: partial match found)"));
        assert!(report.contains("(Entry not restored: network unreachable)"));
        assert!(report.contains("(Entry not saved: not restored)"));
        assert!(report.contains("(Entry saved)"));
        assert!(report.contains("5 MB (5242880 B)"));
        assert!(report.contains("120 ms"));

        let restored_row = report.lines().find(|l| l.starts_with("Entries Restored")).unwrap();
        let columns: Vec<&str> = restored_row.split_whitespace().collect();
        assert_eq!(columns, vec!["Entries", "Restored", "1", "5", "120"]);
    }

    #[test]
    fn report_explains_existing_key_and_write_only() {
        let mut listener = CacheListener::new();
        listener.set_write_only();
        listener.entry("home").mark_already_exists("K");

        let report = listener.generate_report();
        assert!(report.contains("(Entry not restored: cache is write-only)"));
        assert!(report.contains("(Entry not saved: entry with key already exists)"));
    }
}
