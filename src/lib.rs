//! gradle-cache - Gradle User Home caching for CI jobs
//!
//! Restores Gradle User Home at the start of a job, then cleans it up,
//! splits out large reusable content and saves it at the end.

pub mod build_results;
pub mod cache;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gradle;
pub mod runner;
pub mod state;
pub mod ui;

pub use error::{CacheError, CacheResult};
