// ABOUTME: Bounded-time execution of external commands with captured output
//
// Every call spawns exactly one child in its own process group. On timeout the whole
// group is killed and the child reaped before returning, so a hung `git` (slow
// network filesystem, credential helper, pager) never leaves zombies behind.
// Whether a non-zero exit is an error is decided per call through `ExitPolicy`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum number of stderr bytes kept in a `NonZeroExit` error
const STDERR_EXCERPT_LEN: usize = 512;

/// Errors produced while running an external command
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessError {
    /// The command did not finish within its timeout and was killed
    #[error("`{program}` timed out after {timeout_ms}ms")]
    TimedOut {
        /// Program that was running
        program: String,
        /// Timeout that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// The command could not be started at all
    #[error("Failed to launch `{program}`: {reason}")]
    LaunchFailed {
        /// Program that failed to start
        program: String,
        /// OS-level reason
        reason: String,
    },

    /// The command exited with a code the caller did not accept
    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Exit code (-1 when terminated by a signal)
        code: i32,
        /// Leading part of stderr for diagnosis
        stderr: String,
    },
}

/// How a caller interprets the exit code of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Only exit code 0 is a success
    RequireSuccess,
    /// Any exit code is returned to the caller as output
    AcceptAny,
    /// Exit code 0 and the listed codes are returned as output
    Accept(Vec<i32>),
}

impl ExitPolicy {
    fn accepts(&self, code: i32) -> bool {
        match self {
            Self::RequireSuccess => code == 0,
            Self::AcceptAny => true,
            Self::Accept(codes) => code == 0 || codes.contains(&code),
        }
    }
}

/// A single command invocation
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub exit_policy: ExitPolicy,
}

impl CommandRequest {
    pub fn new<I, S>(program: impl Into<String>, args: I, cwd: &Path, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: cwd.to_path_buf(),
            timeout,
            exit_policy: ExitPolicy::RequireSuccess,
        }
    }

    #[must_use]
    pub fn with_exit_policy(mut self, exit_policy: ExitPolicy) -> Self {
        self.exit_policy = exit_policy;
        self
    }

    /// Human readable form for logs
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ProcessOutput {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam for anything that executes commands
///
/// Returns an owned future so implementations can be shared behind `Arc<dyn _>`
/// and mocked in tests.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, request: CommandRequest) -> BoxFuture<'static, Result<ProcessOutput, ProcessError>>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Extra environment applied to every command
    env: Vec<(String, String)>,
}

impl ProcessRunner {
    /// Runner with the non-interactive, lock-free environment used for git probes
    pub fn for_git() -> Self {
        Self {
            env: vec![
                ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
                ("GIT_OPTIONAL_LOCKS".to_string(), "0".to_string()),
                ("LC_ALL".to_string(), "C".to_string()),
            ],
        }
    }

    /// Execute a request to completion or timeout
    pub async fn execute(&self, request: &CommandRequest) -> Result<ProcessOutput, ProcessError> {
        let program = request.program.clone();
        debug!(command = %request.display(), cwd = %request.cwd.display(), "Running command");

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.env {
            command.env(key, value);
        }

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ProcessError::LaunchFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        let deadline = tokio::time::Instant::now() + request.timeout;
        let mut stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let timed_out = ProcessError::TimedOut {
            program: program.clone(),
            timeout_ms: u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX),
        };

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ProcessError::LaunchFailed {
                    program,
                    reason: format!("wait failed: {e}"),
                });
            }
            Err(_) => {
                warn!(
                    command = %request.display(),
                    timeout_ms = request.timeout.as_millis(),
                    "Command timed out, killing process group"
                );
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already gone after group kill");
                }
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(timed_out);
            }
        };

        // A backgrounded grandchild can keep the pipes open after the child exits
        let collected = tokio::time::timeout_at(deadline, async {
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match collected {
            Ok(pipes) => pipes,
            Err(_) => {
                warn!(command = %request.display(), "Output pipes still open at deadline");
                kill_process_group(pid);
                stdout_task.abort();
                stderr_task.abort();
                return Err(timed_out);
            }
        };
        let exit_code = status.code().unwrap_or(-1);

        if !request.exit_policy.accepts(exit_code) {
            debug!(command = %request.display(), code = exit_code, "Command rejected by exit policy");
            return Err(ProcessError::NonZeroExit {
                code: exit_code,
                stderr: excerpt(&stderr, STDERR_EXCERPT_LEN),
            });
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, request: CommandRequest) -> BoxFuture<'static, Result<ProcessOutput, ProcessError>> {
        let runner = self.clone();
        Box::pin(async move { runner.execute(&request).await })
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!(error = %e, "Failed to read child pipe");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    // The child leads its own group (process_group(0)), so pgid == pid
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid = pid, error = %e, "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Truncate text on a char boundary for logs and error payloads
pub fn excerpt(text: &str, max: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut end = max;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
