// ABOUTME: Behavioral tests for the polling scheduler driving real git probes:
// add, refresh after a working-tree change, remove, and shutdown.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

use gitbar::config::EngineConfig;
use gitbar::git::ProbeError;
use gitbar::scheduler::{EngineError, PollingScheduler, ProjectSnapshot};

use crate::fixtures::TestRepo;
use crate::require_git;

const WAIT: Duration = Duration::from_secs(30);

fn manual_only() -> EngineConfig {
    EngineConfig {
        discovery_enabled: false,
        ..EngineConfig::default()
    }
}

/// Wait until the published snapshot satisfies `condition`
async fn wait_until<F>(scheduler: &PollingScheduler, condition: F) -> Result<ProjectSnapshot>
where
    F: FnMut(&ProjectSnapshot) -> bool,
{
    let mut updates = scheduler.subscribe();
    let snapshot = tokio::time::timeout(WAIT, updates.wait_for(condition)).await??;
    Ok(snapshot.clone())
}

fn refreshed_with(id: &Path, untracked: u32) -> impl FnMut(&ProjectSnapshot) -> bool + '_ {
    move |snapshot| {
        snapshot.get(id).is_some_and(|p| {
            !p.is_refreshing && p.state.has_been_refreshed() && p.state.untracked_count == untracked
        })
    }
}

#[tokio::test]
async fn test_added_project_is_probed_and_refreshable() -> Result<()> {
    require_git!();
    // GIVEN: A running scheduler and a clean repository
    let repo = TestRepo::new()?;
    let scheduler = PollingScheduler::start(&manual_only()).await?;

    // WHEN: Adding the repository
    let added = scheduler.add_project(repo.path()).await?;

    // THEN: It is tracked under its canonical root and gets a first status
    assert_eq!(added.id, repo.path());
    let snapshot = wait_until(&scheduler, refreshed_with(repo.path(), 0)).await?;
    let project = &snapshot[repo.path()];
    assert_eq!(project.state.branch_name.as_deref(), Some("main"));
    assert_eq!(project.consecutive_failures, 0);

    // WHEN: The working tree changes and a refresh is requested
    repo.write("new.txt", "hello\n")?;
    scheduler.refresh(repo.path()).await?;

    // THEN: The new file shows up well before the next poll would run
    wait_until(&scheduler, refreshed_with(repo.path(), 1)).await?;

    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_removed_project_disappears_from_snapshot() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    let scheduler = PollingScheduler::start(&manual_only()).await?;
    scheduler.add_project(repo.path()).await?;
    wait_until(&scheduler, refreshed_with(repo.path(), 0)).await?;

    scheduler.remove_project(repo.path()).await?;

    assert!(scheduler.project(repo.path()).is_none());
    assert_eq!(
        scheduler.refresh(repo.path()).await,
        Err(EngineError::UnknownProject(repo.path().to_path_buf()))
    );
    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_subdirectory_is_tracked_at_its_root() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    let nested = repo.path().join("docs");
    std::fs::create_dir_all(&nested)?;
    let scheduler = PollingScheduler::start(&manual_only()).await?;

    let added = scheduler.add_project(&nested).await?;

    assert_eq!(added.id, repo.path());
    assert_eq!(scheduler.snapshot().len(), 1);
    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_plain_directory_is_rejected() -> Result<()> {
    require_git!();
    let dir = TempDir::new()?;
    let scheduler = PollingScheduler::start(&manual_only()).await?;

    let result = scheduler.add_project(dir.path()).await;

    assert!(matches!(result, Err(EngineError::InvalidProject { .. })));
    assert!(scheduler.snapshot().is_empty());
    scheduler.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_git_binary_fails_at_start() {
    let config = EngineConfig {
        git_binary: "gitbar-no-such-git-binary".to_string(),
        ..manual_only()
    };

    let result = PollingScheduler::start(&config).await;

    assert!(matches!(result, Err(EngineError::ToolUnavailable(_))));
}

#[tokio::test]
async fn test_configured_project_missing_at_start_is_tracked_with_error() -> Result<()> {
    require_git!();
    // GIVEN: A configured project path that does not exist yet
    let dir = TempDir::new()?;
    let missing = dir.path().join("not-mounted");
    let scheduler = PollingScheduler::start(&manual_only()).await?;

    // WHEN: Tracking it the way the watch command tracks configured projects
    let tracked = scheduler.track_project(&missing).await?;

    // THEN: It is in the snapshot with an unreachable error instead of being dropped
    assert_eq!(tracked.id, missing);
    let snapshot = wait_until(&scheduler, |s| {
        s.get(&missing).is_some_and(|p| p.state.last_error.is_some())
    })
    .await?;
    let project = &snapshot[missing.as_path()];
    assert_eq!(
        project.state.last_error,
        Some(ProbeError::PathUnreachable { path: missing.clone() })
    );
    assert_eq!(project.consecutive_failures, 1);
    scheduler.shutdown().await;
    Ok(())
}
