//! Report command - print the cache report recorded for this job

use crate::cli::args::{OutputFormat, ReportArgs};
use crate::config::Deprecations;
use crate::error::CacheResult;
use crate::state::JobState;
use std::path::Path;

/// Execute the report command
pub async fn execute(
    args: ReportArgs,
    deprecations: &Deprecations,
    state_path: &Path,
) -> CacheResult<()> {
    let listener = JobState::load(state_path).await?.listener()?;

    match args.format {
        OutputFormat::Text => {
            print!("{}", deprecations.render());
            print!("{}", listener.generate_report());
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "deprecations": deprecations.messages(),
                "cache": listener,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
