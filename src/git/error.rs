// ABOUTME: Error types for parsing git output and probing repositories

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::process::runner::{excerpt, ProcessError};

/// Longest raw-output excerpt carried in a parse error
const RAW_EXCERPT_LEN: usize = 240;

/// Output from git that could not be interpreted
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Unparseable {context} output: {reason} (raw: {raw})")]
pub struct ParseError {
    /// Which command's output was being parsed
    pub context: String,
    pub reason: String,
    /// Excerpt of the offending output
    pub raw: String,
}

impl ParseError {
    pub fn new(context: &str, reason: impl Into<String>, raw: &str) -> Self {
        Self {
            context: context.to_string(),
            reason: reason.into(),
            raw: excerpt(raw, RAW_EXCERPT_LEN),
        }
    }
}

/// Why a repository refresh failed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("Not a git repository: {}", .path.display())]
    NotAGitRepository { path: PathBuf },

    #[error("Path is unreachable: {}", .path.display())]
    PathUnreachable { path: PathBuf },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The probe task panicked before producing a result
    #[error("Probe of {} stopped unexpectedly", .path.display())]
    Aborted { path: PathBuf },
}

impl ProbeError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Process(ProcessError::TimedOut { .. }))
    }

    /// Failures that may clear up by themselves on a later cycle
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Process(_) | Self::Parse(_) | Self::Aborted { .. })
    }
}
