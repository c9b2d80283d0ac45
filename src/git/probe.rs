// ABOUTME: Refreshes a single repository by running read-only git commands and parsing their output
//
// One probe = primary status, worktree listing (with per-worktree dirtiness), and
// commit activity. Either a complete `ProbeReport` comes back or an error does;
// callers never see a half-updated state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};

use super::activity::{self, LOG_ARGS};
use super::error::{ParseError, ProbeError};
use super::status_parser::StatusSnapshot;
use super::worktree_parser::parse_worktree_list;
use crate::models::{CommitActivity, RepositoryState, WorktreeRecord};
use crate::process::runner::excerpt;
use crate::process::{CommandRequest, CommandRunner, ExitPolicy, GitTool, ProcessError, ProcessOutput};

/// Exit code git uses for unknown options (e.g. `--porcelain=v2` before 2.11)
const EXIT_USAGE: i32 = 129;
/// Exit code git uses for fatal errors such as "not a git repository"
const EXIT_FATAL: i32 = 128;

const STATUS_V2_ARGS: [&str; 4] = ["status", "--porcelain=v2", "--branch", "--untracked-files=normal"];
const STATUS_V1_BRANCH_ARGS: [&str; 4] = ["status", "--porcelain", "--branch", "--untracked-files=no"];
const STATUS_V1_CHANGES_ARGS: [&str; 3] = ["status", "--porcelain", "--untracked-files=normal"];
const HEAD_SHA_ARGS: [&str; 4] = ["rev-parse", "--verify", "--quiet", "HEAD"];
const WORKTREE_ARGS: [&str; 3] = ["worktree", "list", "--porcelain"];
const TOPLEVEL_ARGS: [&str; 2] = ["rev-parse", "--show-toplevel"];

/// Everything one successful probe learned about a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub state: RepositoryState,
    pub worktrees: Vec<WorktreeRecord>,
    pub activity: CommitActivity,
}

/// Seam between the scheduler and the git-backed probe
#[cfg_attr(test, mockall::automock)]
pub trait RepositoryProber: Send + Sync {
    /// Refresh the repository rooted at `path`
    fn probe(&self, path: PathBuf) -> BoxFuture<'static, Result<ProbeReport, ProbeError>>;

    /// Resolve `path` to the canonical root of the working tree containing it
    fn validate(&self, path: PathBuf) -> BoxFuture<'static, Result<PathBuf, ProbeError>>;
}

/// Probe backed by the `git` command-line client
#[derive(Clone)]
pub struct RepositoryProbe {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl RepositoryProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, tool: &GitTool, timeout: Duration) -> Self {
        Self::with_program(runner, tool.program(), timeout)
    }

    /// Build a probe for a git binary that has not been located through [`GitTool`]
    pub fn with_program(runner: Arc<dyn CommandRunner>, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            runner,
            program: program.into(),
            timeout,
        }
    }

    /// Run a full refresh of one repository
    pub async fn probe_path(&self, path: &Path) -> Result<ProbeReport, ProbeError> {
        let root = canonical(path).await?;
        debug!(path = %root.display(), "Probing repository");

        // A repository whose .git vanished would otherwise report the enclosing one
        let toplevel = self.toplevel(&root).await?;
        if toplevel != root {
            info!(
                path = %root.display(),
                toplevel = %toplevel.display(),
                "Path is no longer the root of a working tree"
            );
            return Err(ProbeError::NotAGitRepository { path: root });
        }

        let status = self.status(&root).await?;
        let worktrees = self.worktrees(&root, &status).await?;
        let activity = if status.head_sha.is_some() {
            self.activity(&root).await?
        } else {
            // unborn HEAD: nothing to log
            CommitActivity::empty()
        };

        let state = RepositoryState {
            path: root,
            branch_name: status.branch_name,
            is_detached: status.is_detached,
            ahead_count: status.ahead,
            behind_count: status.behind,
            staged_count: status.staged,
            unstaged_count: status.unstaged,
            untracked_count: status.untracked,
            has_remote: status.has_remote,
            head_commit_sha: status.head_sha,
            last_refreshed_at: Some(Utc::now()),
            last_error: None,
        };

        Ok(ProbeReport {
            state,
            worktrees,
            activity,
        })
    }

    /// Resolve `path` to its canonical working-tree root
    pub async fn validate_path(&self, path: &Path) -> Result<PathBuf, ProbeError> {
        let dir = canonical(path).await?;
        self.toplevel(&dir).await
    }

    /// Canonical root of the working tree git finds from `dir`
    async fn toplevel(&self, dir: &Path) -> Result<PathBuf, ProbeError> {
        let output = self.run(dir, &TOPLEVEL_ARGS, ExitPolicy::AcceptAny).await?;
        if !output.success() {
            return Err(classify_failure(dir, output));
        }

        let toplevel = output.stdout.trim();
        if toplevel.is_empty() {
            return Err(ProbeError::NotAGitRepository { path: dir.to_path_buf() });
        }
        let toplevel = PathBuf::from(toplevel);
        Ok(tokio::fs::canonicalize(&toplevel).await.unwrap_or(toplevel))
    }

    /// Primary status of the working tree at `dir`
    async fn status(&self, dir: &Path) -> Result<StatusSnapshot, ProbeError> {
        let output = self
            .run(dir, &STATUS_V2_ARGS, ExitPolicy::Accept(vec![EXIT_USAGE, EXIT_FATAL]))
            .await?;

        if output.success() {
            return Ok(StatusSnapshot::parse(&output.stdout));
        }
        if output.exit_code != EXIT_USAGE {
            return Err(classify_failure(dir, output));
        }

        debug!(path = %dir.display(), "git does not support porcelain v2, falling back to v1");
        self.status_v1(dir).await
    }

    /// Split-framing status for git releases without porcelain v2
    async fn status_v1(&self, dir: &Path) -> Result<StatusSnapshot, ProbeError> {
        let branch = self
            .run(dir, &STATUS_V1_BRANCH_ARGS, ExitPolicy::Accept(vec![EXIT_FATAL]))
            .await?;
        if !branch.success() {
            return Err(classify_failure(dir, branch));
        }
        let changes = self.run(dir, &STATUS_V1_CHANGES_ARGS, ExitPolicy::RequireSuccess).await?;

        let mut snapshot = StatusSnapshot::parse_split(&branch.stdout, &changes.stdout);

        // `--verify --quiet` exits 1 with no output on an unborn HEAD
        let head = self.run(dir, &HEAD_SHA_ARGS, ExitPolicy::Accept(vec![1])).await?;
        let sha = head.stdout.trim();
        snapshot.head_sha = (head.success() && !sha.is_empty()).then(|| sha.to_string());
        Ok(snapshot)
    }

    async fn worktrees(&self, root: &Path, primary: &StatusSnapshot) -> Result<Vec<WorktreeRecord>, ProbeError> {
        let output = self.run(root, &WORKTREE_ARGS, ExitPolicy::AcceptAny).await?;
        if !output.success() {
            info!(
                path = %root.display(),
                exit_code = output.exit_code,
                "git worktree list unavailable, reporting the main worktree only"
            );
            return Ok(vec![synthetic_main(root, primary)]);
        }

        let mut records = parse_worktree_list(&output.stdout).map_err(|e| log_parse_error(root, e))?;
        if records.is_empty() {
            return Ok(vec![synthetic_main(root, primary)]);
        }

        for record in &mut records {
            record.has_uncommitted_changes = if record.is_bare || record.is_prunable {
                false
            } else if same_path(&record.path, root).await {
                primary.has_uncommitted_changes()
            } else {
                self.status(&record.path).await?.has_uncommitted_changes()
            };
        }
        Ok(records)
    }

    async fn activity(&self, root: &Path) -> Result<CommitActivity, ProbeError> {
        let output = self.run(root, &LOG_ARGS, ExitPolicy::RequireSuccess).await?;
        activity::aggregate(&output.stdout, &Local::now()).map_err(|e| log_parse_error(root, e))
    }

    async fn run(&self, dir: &Path, args: &[&str], policy: ExitPolicy) -> Result<ProcessOutput, ProbeError> {
        let request = CommandRequest::new(self.program.as_str(), args.iter().copied(), dir, self.timeout)
            .with_exit_policy(policy);
        let command = request.display();

        self.runner.run(request).await.map_err(|e| {
            match &e {
                ProcessError::TimedOut { .. } => {
                    warn!(path = %dir.display(), command = %command, error = %e, "git command timed out");
                }
                _ => debug!(path = %dir.display(), command = %command, error = %e, "git command failed"),
            }
            ProbeError::from(e)
        })
    }
}

impl RepositoryProber for RepositoryProbe {
    fn probe(&self, path: PathBuf) -> BoxFuture<'static, Result<ProbeReport, ProbeError>> {
        let probe = self.clone();
        Box::pin(async move { probe.probe_path(&path).await })
    }

    fn validate(&self, path: PathBuf) -> BoxFuture<'static, Result<PathBuf, ProbeError>> {
        let probe = self.clone();
        Box::pin(async move { probe.validate_path(&path).await })
    }
}

async fn canonical(path: &Path) -> Result<PathBuf, ProbeError> {
    let unreachable = || ProbeError::PathUnreachable {
        path: path.to_path_buf(),
    };
    let dir = tokio::fs::canonicalize(path).await.map_err(|_| unreachable())?;
    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => Ok(dir),
        _ => Err(unreachable()),
    }
}

async fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match tokio::fs::canonicalize(a).await {
        Ok(resolved) => resolved == b,
        Err(_) => false,
    }
}

fn classify_failure(dir: &Path, output: ProcessOutput) -> ProbeError {
    if output.stderr.to_ascii_lowercase().contains("not a git repository") {
        return ProbeError::NotAGitRepository {
            path: dir.to_path_buf(),
        };
    }
    ProbeError::Process(ProcessError::NonZeroExit {
        code: output.exit_code,
        stderr: excerpt(&output.stderr, 512),
    })
}

fn synthetic_main(root: &Path, primary: &StatusSnapshot) -> WorktreeRecord {
    WorktreeRecord {
        path: root.to_path_buf(),
        branch_name: primary.branch_name.clone(),
        head_commit_sha: primary.head_sha.clone(),
        is_detached: primary.is_detached,
        is_main: true,
        has_uncommitted_changes: primary.has_uncommitted_changes(),
        is_bare: false,
        is_prunable: false,
    }
}

fn log_parse_error(path: &Path, error: ParseError) -> ProbeError {
    warn!(
        path = %path.display(),
        context = %error.context,
        reason = %error.reason,
        raw = %error.raw,
        "Failed to parse git output"
    );
    ProbeError::Parse(error)
}
