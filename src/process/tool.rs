// ABOUTME: One-time detection of the git command-line client
//
// The engine refuses to start without a usable `git`; this check runs once so a
// missing tool is reported as a single startup failure rather than as an error on
// every tracked project.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::runner::{CommandRequest, ProcessRunner};

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("`{binary}` was not found on PATH: {reason}")]
    NotFound { binary: String, reason: String },

    #[error("`{binary}` is installed but not usable: {reason}")]
    Unusable { binary: String, reason: String },
}

/// A located, working git binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTool {
    binary: PathBuf,
    version: String,
}

impl GitTool {
    pub fn new(binary: PathBuf, version: impl Into<String>) -> Self {
        Self {
            binary,
            version: version.into(),
        }
    }

    /// Resolve `binary` on PATH and confirm it answers `--version`
    pub async fn locate(binary: &str) -> Result<Self, ToolError> {
        let resolved = which::which(binary).map_err(|e| ToolError::NotFound {
            binary: binary.to_string(),
            reason: e.to_string(),
        })?;
        debug!(binary = %resolved.display(), "Resolved git binary");

        let request = CommandRequest::new(
            resolved.to_string_lossy(),
            ["--version"],
            &std::env::temp_dir(),
            VERSION_CHECK_TIMEOUT,
        );
        let output = ProcessRunner::for_git()
            .execute(&request)
            .await
            .map_err(|e| ToolError::Unusable {
                binary: binary.to_string(),
                reason: e.to_string(),
            })?;

        let version = parse_version(&output.stdout).ok_or_else(|| ToolError::Unusable {
            binary: binary.to_string(),
            reason: format!("unexpected --version output: {}", output.stdout.trim()),
        })?;

        info!(binary = %resolved.display(), version = %version, "git available");
        Ok(Self::new(resolved, version))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn program(&self) -> String {
        self.binary.to_string_lossy().into_owned()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Extract `2.43.0` from `git version 2.43.0` (platform suffixes are kept)
fn parse_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()?
        .trim()
        .strip_prefix("git version ")
        .map(str::to_string)
        .filter(|v| !v.is_empty())
}
