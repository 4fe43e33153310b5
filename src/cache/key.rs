//! Hierarchical cache key generation
//!
//! A key narrows from "same OS" down to "same commit":
//!
//! ```text
//! <prefix>gradle-<name>-<protocol>|<os-arch>|<job>[<instance-hash>]-<sha>
//! \__________ base __________/
//! \________________ environment ________/
//! \____________________ job ___________/
//! \_______________________ job instance ____________/
//! ```
//!
//! The store tries the exact key first, then each restore key as a prefix.

use crate::cache::hash::hash_strings;
use crate::config::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bumped whenever cached content becomes incompatible
pub const CACHE_PROTOCOL_VERSION: &str = "v1";

const CACHE_KEY_PREFIX_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_KEY_PREFIX";
const CACHE_KEY_OS_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_KEY_ENVIRONMENT";
const CACHE_KEY_JOB_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_KEY_JOB";
const CACHE_KEY_JOB_INSTANCE_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_KEY_JOB_INSTANCE";
const CACHE_KEY_JOB_EXECUTION_VAR: &str = "GRADLE_BUILD_ACTION_CACHE_KEY_JOB_EXECUTION";

/// A key used to restore and save a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Exact key for this job execution
    pub key: String,
    /// Fallback prefixes, most specific first
    pub restore_keys: Vec<String>,
}

/// Identity of the running job, resolved once from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyContext {
    /// Operator-supplied prefix prepended to every key
    pub prefix: String,
    /// Runner OS and architecture, e.g. `Linux-X64`
    pub environment: String,
    /// Job identifier
    pub job: String,
    /// Overrides the workflow + matrix hash when set
    pub job_instance: Option<String>,
    /// Workflow name
    pub workflow: String,
    /// Execution identifier, normally the commit SHA
    pub execution: String,
}

impl KeyContext {
    /// Resolve the key context from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the key context through a variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let environment = get(CACHE_KEY_OS_VAR).unwrap_or_else(|| {
            format!(
                "{}-{}",
                get("RUNNER_OS").unwrap_or_default(),
                get("RUNNER_ARCH").unwrap_or_default()
            )
        });

        Self {
            prefix: get(CACHE_KEY_PREFIX_VAR).unwrap_or_default(),
            environment,
            job: get(CACHE_KEY_JOB_VAR)
                .or_else(|| get("GITHUB_JOB"))
                .unwrap_or_default(),
            job_instance: get(CACHE_KEY_JOB_INSTANCE_VAR),
            workflow: get("GITHUB_WORKFLOW").unwrap_or_default(),
            execution: get(CACHE_KEY_JOB_EXECUTION_VAR)
                .or_else(|| get("GITHUB_SHA"))
                .unwrap_or_default(),
        }
    }
}

/// Base of every key for a named cache
pub fn cache_key_base(cache_name: &str, protocol_version: &str) -> String {
    format!("gradle-{}-{}", cache_name, protocol_version)
}

/// Generate the key for `cache_name` in the current job.
///
/// With strict matching only the job-instance prefix is offered as a fallback;
/// otherwise the job and environment prefixes follow in decreasing specificity.
pub fn generate_cache_key(
    cache_name: &str,
    config: &CacheConfig,
    context: &KeyContext,
) -> CacheKey {
    let base = format!(
        "{}{}",
        context.prefix,
        cache_key_base(cache_name, CACHE_PROTOCOL_VERSION)
    );

    // At the most general level, share caches for all executions on the same OS
    let for_environment = format!("{}|{}", base, context.environment);

    // Then prefer caches that ran the same job
    let for_job = format!("{}|{}", for_environment, context.job);

    // Prefer (even more) the same job with the same workflow and matrix
    let for_job_instance = format!("{}[{}]", for_job, job_instance_hash(config, context));

    let key = format!("{}-{}", for_job_instance, context.execution);

    let restore_keys = if config.strict_match {
        vec![for_job_instance]
    } else {
        vec![for_job_instance, for_job, for_environment]
    };

    CacheKey { key, restore_keys }
}

fn job_instance_hash(config: &CacheConfig, context: &KeyContext) -> String {
    if let Some(instance) = &context.job_instance {
        return instance.clone();
    }
    hash_strings([
        context.workflow.as_str(),
        canonical_matrix(&config.job_matrix).as_str(),
    ])
}

/// Render matrix JSON with object keys sorted, so insertion order is irrelevant.
///
/// Input that is not valid JSON is used verbatim.
pub fn canonical_matrix(matrix: &str) -> String {
    match serde_json::from_str::<Value>(matrix) {
        Ok(value) => {
            let mut out = String::new();
            write_canonical(&value, &mut out);
            out
        }
        Err(_) => matrix.to_string(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
