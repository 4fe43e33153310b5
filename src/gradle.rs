//! Gradle executables
//!
//! Version comparison, invocation of the `gradle` launcher, and provisioning
//! of a distribution when the job does not provide a suitable one.

use crate::config::schema::CleanupConfig;
use crate::error::{CacheError, CacheResult};
use async_trait::async_trait;
use semver::Version;
use std::cmp::Ordering;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Launcher script of a Gradle installation
pub fn launcher(gradle_home: &Path) -> PathBuf {
    if cfg!(windows) {
        gradle_home.join("bin").join("gradle.bat")
    } else {
        gradle_home.join("bin").join("gradle")
    }
}

/// Parse a Gradle version such as `8.11`, `8.12-rc-1` or `8.5.1` into semver.
///
/// Missing minor and patch components default to zero.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    let (release, qualifier) = match version.split_once('-') {
        Some((release, qualifier)) => (release, Some(qualifier)),
        None => (version, None),
    };

    let mut parts = release.split('.').map(|p| p.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }

    let coerced = match qualifier {
        Some(q) => format!("{}.{}.{}-{}", major, minor, patch, q),
        None => format!("{}.{}.{}", major, minor, patch),
    };
    Version::parse(&coerced).ok()
}

/// Whether `actual` satisfies a minimum of `required`.
///
/// A pre-release only satisfies the minimum if its release is strictly greater.
pub fn version_is_at_least(actual: &str, required: &str) -> bool {
    if actual == required {
        return true;
    }
    let (Some(actual), Some(required)) = (parse_version(actual), parse_version(required)) else {
        return false;
    };
    let release = |v: &Version| (v.major, v.minor, v.patch);
    match release(&actual).cmp(&release(&required)) {
        Ordering::Greater => true,
        Ordering::Equal => actual.pre.is_empty(),
        Ordering::Less => false,
    }
}

/// Order two Gradle versions; unparseable versions sort first
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Runs a build tool to completion
#[async_trait]
pub trait BuildToolRunner: Send + Sync {
    /// Run `executable` in `cwd`, returning its exit code.
    ///
    /// A non-zero exit code is a build failure, not an error.
    async fn run(&self, executable: &Path, args: &[String], cwd: &Path) -> CacheResult<i32>;
}

/// Runs the build tool as a child process sharing our stdio
pub struct CommandRunner;

#[async_trait]
impl BuildToolRunner for CommandRunner {
    async fn run(&self, executable: &Path, args: &[String], cwd: &Path) -> CacheResult<i32> {
        debug!("Executing: {} {:?} in {}", executable.display(), args, cwd.display());

        let status = Command::new(executable)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| CacheError::command_failed(executable.display().to_string(), e))?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Locates or installs a Gradle distribution
#[async_trait]
pub trait GradleProvisioner: Send + Sync {
    /// Path to a Gradle launcher of at least `version`
    async fn provision_at_least(&self, version: &str) -> CacheResult<PathBuf>;
}

/// Provisions Gradle from the tool directory, `PATH`, or the distributions server
pub struct DistributionProvisioner {
    distributions_url: String,
    tool_dir: PathBuf,
    attempts: u32,
}

impl DistributionProvisioner {
    pub fn new(distributions_url: impl Into<String>, tool_dir: PathBuf, attempts: u32) -> Self {
        Self {
            distributions_url: distributions_url.into(),
            tool_dir,
            attempts: attempts.max(1),
        }
    }

    /// Build from configuration; `default_tool_dir` is used when none is configured
    pub fn from_config(config: &CleanupConfig, default_tool_dir: PathBuf) -> Self {
        Self::new(
            config.distributions_url.trim_end_matches('/'),
            config.tool_dir.clone().unwrap_or(default_tool_dir),
            config.download_attempts,
        )
    }

    fn install_dir(&self, version: &str) -> PathBuf {
        self.tool_dir.join("installs").join(format!("gradle-{}", version))
    }

    fn distribution_url(&self, version: &str) -> String {
        format!("{}/gradle-{}-bin.zip", self.distributions_url, version)
    }

    /// Version of the `gradle` found on `PATH`, if any
    async fn path_version() -> Option<String> {
        let output = Command::new(if cfg!(windows) { "gradle.bat" } else { "gradle" })
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_version_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(&self, version: &str) -> CacheResult<PathBuf> {
        let url = self.distribution_url(version);
        let downloads = self.tool_dir.join("downloads");
        let archive = downloads.join(format!("gradle-{}-bin.zip", version));

        let mut delay = Duration::from_secs(1);
        for attempt in 1..=self.attempts {
            info!("Downloading {} (attempt {}/{})", url, attempt, self.attempts);
            match download_file(url.clone(), archive.clone(), version.to_string()).await {
                Ok(()) => break,
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!("Download failed: {}. Retrying in {}s", e, delay.as_secs());
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        let installs = self.tool_dir.join("installs");
        let version_owned = version.to_string();
        tokio::task::spawn_blocking(move || unzip(&archive, &installs, &version_owned))
            .await
            .map_err(|e| CacheError::Internal(format!("unzip task failed: {}", e)))??;

        installed_launcher(&self.install_dir(version))
    }
}

#[async_trait]
impl GradleProvisioner for DistributionProvisioner {
    async fn provision_at_least(&self, version: &str) -> CacheResult<PathBuf> {
        let installed = launcher(&self.install_dir(version));
        if installed.exists() {
            debug!("Using Gradle {} from {}", version, installed.display());
            return Ok(installed);
        }

        if let Some(found) = Self::path_version().await {
            if version_is_at_least(&found, version) {
                info!("Using Gradle {} found on PATH", found);
                return Ok(PathBuf::from(if cfg!(windows) { "gradle.bat" } else { "gradle" }));
            }
            debug!("Gradle {} on PATH is older than {}", found, version);
        }

        self.download(version).await
    }
}

/// Launcher of an unpacked distribution, which must contain one
fn installed_launcher(install_dir: &Path) -> CacheResult<PathBuf> {
    let executable = launcher(install_dir);
    if !executable.exists() {
        return Err(CacheError::GradleNotFound(executable));
    }
    Ok(executable)
}

/// Extract the version from `gradle --version` output
fn parse_version_output(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Gradle "))
        .map(|v| v.trim().to_string())
}

async fn download_file(url: String, dest: PathBuf, version: String) -> CacheResult<()> {
    tokio::task::spawn_blocking(move || {
        let provision_err = |reason: String| CacheError::Provision {
            version: version.clone(),
            reason,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
        }

        let response = ureq::get(&url)
            .call()
            .map_err(|e| provision_err(format!("GET {} failed: {}", url, e)))?;

        let partial = dest.with_extension("zip.part");
        let mut file = File::create(&partial)
            .map_err(|e| CacheError::io(format!("creating {}", partial.display()), e))?;
        let mut reader = response.into_body().into_reader();
        std::io::copy(&mut reader, &mut file)
            .map_err(|e| provision_err(format!("reading {} failed: {}", url, e)))?;

        std::fs::rename(&partial, &dest)
            .map_err(|e| CacheError::io(format!("moving {}", dest.display()), e))
    })
    .await
    .map_err(|e| CacheError::Internal(format!("download task failed: {}", e)))?
}

fn unzip(archive: &Path, dest: &Path, version: &str) -> CacheResult<()> {
    let provision_err = |reason: String| CacheError::Provision {
        version: version.to_string(),
        reason,
    };

    let file = File::open(archive)
        .map_err(|e| CacheError::io(format!("opening {}", archive.display()), e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| provision_err(format!("invalid distribution archive: {}", e)))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| provision_err(format!("reading archive entry: {}", e)))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)
                .map_err(|e| CacheError::io(format!("creating {}", out.display()), e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::io(format!("creating {}", parent.display()), e))?;
        }
        let mut target = File::create(&out)
            .map_err(|e| CacheError::io(format!("creating {}", out.display()), e))?;
        std::io::copy(&mut entry, &mut target)
            .map_err(|e| CacheError::io(format!("writing {}", out.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode)).map_err(|e| {
                    CacheError::io(format!("setting permissions on {}", out.display()), e)
                })?;
            }
        }
    }
    Ok(())
}
