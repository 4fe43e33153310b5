//! Gradle User Home caching
//!
//! A CI job restores Gradle User Home before its first build and saves it
//! after the last one. The home is stored as one main entry plus a number of
//! extracted entries for large, slowly-changing content.
//!
//! # Phases
//!
//! | Phase | Entry point | Runs |
//! |-------|-------------|------|
//! | Restore | [`lifecycle::restore`] | Setup step, once per job |
//! | Save | [`lifecycle::save`] | Completion step, after daemons are stopped |
//!
//! # Keys
//!
//! Keys are hierarchical: `<prefix>gradle-home-v1|<os>|<job>[<matrix hash>]-<sha>`.
//! A restore tries the exact key, then the same job and matrix, then the same
//! job, then any job on the same runner OS.

pub mod cleaner;
pub mod extract;
pub mod files;
pub mod hash;
pub mod home;
pub mod key;
pub mod lifecycle;
pub mod local_store;
pub mod report;
pub mod store;

pub use cleaner::CacheCleaner;
pub use extract::{EntryExtractor, ExtractorKind};
pub use home::GradleUserHomeCache;
pub use key::{generate_cache_key, CacheKey, KeyContext};
pub use lifecycle::{BuildTools, CacheContext, RestoreOutcome, SaveOutcome};
pub use local_store::DirectoryStore;
pub use report::{CacheEntryListener, CacheListener};
pub use store::{CacheHit, CacheStore};
