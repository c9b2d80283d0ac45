// ABOUTME: Status command - probes repositories once and prints what was found

use anyhow::{bail, Context, Result};
use futures_util::future::join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::util::{status_header, status_row};
use super::{OutputFormat, StatusArgs};
use crate::config::EngineConfig;
use crate::git::{ProbeError, ProbeReport, RepositoryProbe};
use crate::models::{display_name_for, CommitActivity, RepositoryState, WorktreeRecord};
use crate::process::{GitTool, ProcessRunner};

/// Result of probing one requested path
#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub requested: PathBuf,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RepositoryState>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub worktrees: Vec<WorktreeRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<CommitActivity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, format: OutputFormat, config: &EngineConfig) -> Result<()> {
    let tool = GitTool::locate(&config.git_binary)
        .await
        .context("git is required for status")?;
    let probe = RepositoryProbe::new(Arc::new(ProcessRunner::for_git()), &tool, config.process_timeout);

    let entries = join_all(args.paths.iter().map(|path| probe_one(&probe, path))).await;
    let failed = entries.iter().filter(|e| e.error.is_some()).count();

    match format {
        OutputFormat::Json => output_json(&entries)?,
        OutputFormat::Text => output_text(&entries),
    }

    if failed > 0 {
        bail!("{failed} of {} repositories could not be probed", entries.len());
    }
    Ok(())
}

async fn probe_one(probe: &RepositoryProbe, requested: &Path) -> StatusEntry {
    match validate_and_probe(probe, requested).await {
        Ok(report) => StatusEntry {
            requested: requested.to_path_buf(),
            display_name: display_name_for(&report.state.path),
            state: Some(report.state),
            worktrees: report.worktrees,
            activity: Some(report.activity),
            error: None,
        },
        Err(e) => StatusEntry {
            requested: requested.to_path_buf(),
            display_name: display_name_for(requested),
            state: None,
            worktrees: Vec::new(),
            activity: None,
            error: Some(e.to_string()),
        },
    }
}

async fn validate_and_probe(probe: &RepositoryProbe, requested: &Path) -> Result<ProbeReport, ProbeError> {
    let root = probe.validate_path(requested).await?;
    probe.probe_path(&root).await
}

fn output_json(entries: &[StatusEntry]) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)?;
    println!("{json}");
    Ok(())
}

fn output_text(entries: &[StatusEntry]) {
    println!("{}", status_header());
    println!("{}", "-".repeat(100));

    for entry in entries {
        match (&entry.state, &entry.activity, &entry.error) {
            (Some(state), Some(activity), _) => {
                println!("{}", status_row(&entry.display_name, state, activity));
                for worktree in entry.worktrees.iter().filter(|w| !w.is_main) {
                    let marker = if worktree.has_uncommitted_changes { "*" } else { "" };
                    println!(
                        "  \u{2514} {}{} {}",
                        worktree.branch_name.as_deref().unwrap_or("(detached)"),
                        marker,
                        worktree.path.display()
                    );
                }
            }
            (_, _, Some(error)) => {
                println!("{:<24} error: {}", entry.display_name, error);
            }
            _ => {}
        }
    }
}
