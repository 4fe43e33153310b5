//! Key command - print the cache key of this job

use crate::cache::{generate_cache_key, KeyContext};
use crate::cli::args::{KeyArgs, OutputFormat};
use crate::config::Config;
use crate::error::CacheResult;

/// Execute the key command
pub fn execute(args: KeyArgs, config: &Config) -> CacheResult<()> {
    let key = generate_cache_key(&args.name, &config.cache, &KeyContext::from_env());

    match args.format {
        OutputFormat::Text => {
            println!("{}", key.key);
            for restore_key in &key.restore_keys {
                println!("  {}", restore_key);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&key)?),
    }
    Ok(())
}
