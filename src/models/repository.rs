// ABOUTME: Repository status data model published by the engine
// Snapshot types are plain values; observers always receive clones

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::git::ProbeError;

/// Number of days covered by the activity histogram
pub const ACTIVITY_DAYS: usize = 30;

/// Last known status of one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub path: PathBuf,
    /// `None` when HEAD is detached
    pub branch_name: Option<String>,
    #[serde(default)]
    pub is_detached: bool,
    pub ahead_count: u32,
    pub behind_count: u32,
    pub staged_count: u32,
    pub unstaged_count: u32,
    pub untracked_count: u32,
    pub has_remote: bool,
    pub head_commit_sha: Option<String>,
    /// `None` until the first successful probe
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<ProbeError>,
}

impl RepositoryState {
    /// Placeholder state for a project that has not been probed yet
    pub fn pending(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            branch_name: None,
            is_detached: false,
            ahead_count: 0,
            behind_count: 0,
            staged_count: 0,
            unstaged_count: 0,
            untracked_count: 0,
            has_remote: false,
            head_commit_sha: None,
            last_refreshed_at: None,
            last_error: None,
        }
    }

    pub const fn is_dirty(&self) -> bool {
        self.staged_count + self.unstaged_count + self.untracked_count > 0
    }

    pub const fn is_synced(&self) -> bool {
        self.ahead_count == 0 && self.behind_count == 0
    }

    pub const fn has_been_refreshed(&self) -> bool {
        self.last_refreshed_at.is_some()
    }

    /// Same status, ignoring when it was taken
    pub fn same_status(&self, other: &Self) -> bool {
        Self {
            last_refreshed_at: None,
            ..self.clone()
        } == Self {
            last_refreshed_at: None,
            ..other.clone()
        }
    }

    /// Compact one-line summary, e.g. `main ↑2 ↓1 +1 ~0 ?1`
    pub fn summary(&self) -> String {
        let branch = self
            .branch_name
            .clone()
            .unwrap_or_else(|| "(detached)".to_string());
        let mut parts = vec![branch];
        if self.has_remote {
            parts.push(format!("\u{2191}{} \u{2193}{}", self.ahead_count, self.behind_count));
        } else {
            parts.push("(no upstream)".to_string());
        }
        if self.is_dirty() {
            parts.push(format!(
                "+{} ~{} ?{}",
                self.staged_count, self.unstaged_count, self.untracked_count
            ));
        } else {
            parts.push("clean".to_string());
        }
        parts.join(" ")
    }
}

/// One working tree attached to a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    pub path: PathBuf,
    pub branch_name: Option<String>,
    pub head_commit_sha: Option<String>,
    pub is_detached: bool,
    pub is_main: bool,
    pub has_uncommitted_changes: bool,
    #[serde(default)]
    pub is_bare: bool,
    #[serde(default)]
    pub is_prunable: bool,
}

/// Daily commit counts, index 0 = today, oldest day last
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitActivity {
    days: [u32; ACTIVITY_DAYS],
}

impl CommitActivity {
    pub const fn empty() -> Self {
        Self {
            days: [0; ACTIVITY_DAYS],
        }
    }

    pub const fn from_days(days: [u32; ACTIVITY_DAYS]) -> Self {
        Self { days }
    }

    pub const fn days(&self) -> &[u32; ACTIVITY_DAYS] {
        &self.days
    }

    /// Commits `days_ago` days before today; `None` outside the window
    pub fn on(&self, days_ago: usize) -> Option<u32> {
        self.days.get(days_ago).copied()
    }

    pub(crate) fn record(&mut self, days_ago: usize) {
        if let Some(slot) = self.days.get_mut(days_ago) {
            *slot = slot.saturating_add(1);
        }
    }

    pub fn total(&self) -> u32 {
        self.days.iter().sum()
    }

    /// Most active day as `(days_ago, commits)`; most recent wins ties
    pub fn busiest_day(&self) -> Option<(usize, u32)> {
        self.days
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, count)| *count > 0)
            .fold(None, |best, (idx, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((idx, count)),
            })
    }
}

impl Default for CommitActivity {
    fn default() -> Self {
        Self::empty()
    }
}

/// Where a tracked project came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSource {
    /// Claude Code project transcripts (`~/.claude/projects`)
    ClaudeCode,
    /// VS Code workspace storage
    VsCode,
    /// Added by the user
    Manual,
}

impl ProjectSource {
    pub const fn is_discovered(self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::ClaudeCode => "Claude Code",
            Self::VsCode => "VS Code",
            Self::Manual => "Manual",
        }
    }
}

impl fmt::Display for ProjectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A repository under watch, as published to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProject {
    /// Canonical path of the working tree
    pub id: PathBuf,
    pub display_name: String,
    pub source: ProjectSource,
    pub state: RepositoryState,
    pub activity: CommitActivity,
    pub worktrees: Vec<WorktreeRecord>,
    /// A probe is currently running
    #[serde(default)]
    pub is_refreshing: bool,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl TrackedProject {
    pub fn new(id: PathBuf, display_name: String, source: ProjectSource) -> Self {
        let state = RepositoryState::pending(&id);
        Self {
            id,
            display_name,
            source,
            state,
            activity: CommitActivity::empty(),
            worktrees: Vec::new(),
            is_refreshing: false,
            consecutive_failures: 0,
        }
    }

    pub fn from_discovered(discovered: &DiscoveredProject) -> Self {
        Self::new(
            discovered.path.clone(),
            discovered.display_name.clone(),
            discovered.source,
        )
    }
}

/// A candidate produced by one discovery pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredProject {
    /// Canonical path of the working tree
    pub path: PathBuf,
    pub display_name: String,
    pub source: ProjectSource,
}

/// Display name for a project path (its final component)
pub fn display_name_for(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or_else(|| path.display().to_string(), str::to_string)
}
