//! Results of the Gradle builds run during the job
//!
//! Each instrumented build writes one JSON file into the build results
//! directory. A file is considered processed once a sibling
//! `<file>.processed` marker exists.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Outcome of a single Gradle build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub root_project_name: String,
    pub root_project_dir: PathBuf,
    #[serde(default)]
    pub requested_tasks: String,
    pub gradle_version: String,
    pub gradle_home_dir: PathBuf,
    #[serde(default)]
    pub build_failed: bool,
    #[serde(default)]
    pub config_cache_hit: bool,
}

/// All unprocessed build results of the job
#[derive(Debug, Clone, Default)]
pub struct BuildResults {
    results: Vec<BuildResult>,
    files: Vec<PathBuf>,
}

impl BuildResults {
    pub fn new(results: Vec<BuildResult>) -> Self {
        Self {
            results,
            files: Vec::new(),
        }
    }

    /// Load every unprocessed result file from `dir`
    pub async fn load(dir: &Path) -> CacheResult<Self> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No build results found in {}", dir.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CacheError::io(format!("reading build results in {}", dir.display()), e))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io("reading build results entry", e))?
        {
            let path = entry.path();
            let is_result = path.extension().and_then(|e| e.to_str()) == Some("json");
            if is_result && !marker(&path).exists() {
                files.push(path);
            }
        }
        files.sort();

        let mut results = Vec::new();
        let mut loaded = Vec::new();
        for path in files {
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| {
                    CacheError::io(format!("reading build result {}", path.display()), e)
                })?;
            match serde_json::from_str::<BuildResult>(&content) {
                Ok(result) => {
                    results.push(result);
                    loaded.push(path);
                }
                Err(e) => warn!("Ignoring malformed build result {}: {}", path.display(), e),
            }
        }

        Ok(Self {
            results,
            files: loaded,
        })
    }

    /// Write the `.processed` marker for every loaded result file
    pub async fn mark_processed(&self) -> CacheResult<()> {
        for path in &self.files {
            let marker = marker(path);
            fs::write(&marker, "")
                .await
                .map_err(|e| CacheError::io(format!("writing {}", marker.display()), e))?;
        }
        Ok(())
    }

    pub fn results(&self) -> &[BuildResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn any_failed(&self) -> bool {
        self.results.iter().any(|r| r.build_failed)
    }

    pub fn any_config_cache_hit(&self) -> bool {
        self.results.iter().any(|r| r.config_cache_hit)
    }

    /// Distinct Gradle installations used by the builds
    pub fn unique_gradle_homes(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .map(|r| r.gradle_home_dir.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Newest Gradle version (and its home) that ran a build
    pub fn highest_gradle_version(&self) -> Option<&BuildResult> {
        self.results.iter().fold(None, |best, candidate| match best {
            Some(current) if is_at_least_as_new(current, candidate) => Some(current),
            _ => Some(candidate),
        })
    }
}

fn marker(result_file: &Path) -> PathBuf {
    let mut name = result_file.as_os_str().to_owned();
    name.push(".processed");
    PathBuf::from(name)
}

fn is_at_least_as_new(current: &BuildResult, candidate: &BuildResult) -> bool {
    crate::gradle::compare_versions(&current.gradle_version, &candidate.gradle_version).is_ge()
}


#[cfg(test)]
mod tests {
    use super::testing::result;
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "rootProjectName": "app",
        "rootProjectDir": "/work/app",
        "requestedTasks": "build",
        "gradleVersion": "8.12",
        "gradleHomeDir": "/opt/gradle-8.12",
        "buildFailed": false,
        "buildScanUri": "",
        "buildScanFailed": false
    }"#;

    #[tokio::test]
    async fn load_skips_processed_and_malformed() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.json"), SAMPLE).unwrap();
        std::fs::write(temp.path().join("b.json"), SAMPLE).unwrap();
        std::fs::write(temp.path().join("b.json.processed"), "").unwrap();
        std::fs::write(temp.path().join("c.json"), "{not json").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();

        let results = BuildResults::load(temp.path()).await.unwrap();
        assert_eq!(results.results().len(), 1);
        assert!(!results.results()[0].config_cache_hit);
        assert_eq!(results.results()[0].gradle_version, "8.12");

        results.mark_processed().await.unwrap();
        assert!(temp.path().join("a.json.processed").exists());
        assert!(BuildResults::load(temp.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let results = BuildResults::load(&temp.path().join("missing")).await.unwrap();
        assert!(results.is_empty());
        assert!(!results.any_failed());
    }

    #[test]
    fn aggregates() {
        let mut hit = result("8.6", "/opt/gradle-8.6", false);
        hit.config_cache_hit = true;
        let results = BuildResults::new(vec![
            result("8.12", "/opt/gradle-8.12", true),
            hit,
            result("8.12", "/opt/gradle-8.12", false),
        ]);

        assert!(results.any_failed());
        assert!(results.any_config_cache_hit());
        assert_eq!(
            results.unique_gradle_homes(),
            vec![PathBuf::from("/opt/gradle-8.12"), PathBuf::from("/opt/gradle-8.6")]
        );
        assert_eq!(results.highest_gradle_version().unwrap().gradle_version, "8.12");
    }
}
