//! Console output for the CLI
//!
//! CI logs get plain, prefixed lines; an interactive terminal gets colors
//! and a spinner.
//!
//! # Example
//!
//! ```rust,ignore
//! use gradle_cache::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Restoring Gradle User Home...");
//! // ... do work ...
//! spinner.stop("Restored");
//!
//! ui::step_warn_hint(&ctx, "Cache store not available", "Set GRADLE_CACHE_STORE_DIR");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{key_value, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
