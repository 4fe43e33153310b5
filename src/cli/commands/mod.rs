//! CLI command implementations

pub mod cleanup;
pub mod completions;
pub mod config;
mod job;
pub mod key;
pub mod report;
pub mod restore;
pub mod save;

pub use cleanup::execute as cleanup;
pub use completions::execute as completions;
pub use config::execute as config;
pub use key::execute as key;
pub use report::execute as report;
pub use restore::execute as restore;
pub use save::execute as save;
