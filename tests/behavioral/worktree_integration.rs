// ABOUTME: Behavioral tests for worktree enumeration verifying linked worktrees
// with real git repositories in temporary directories.

use anyhow::Result;
use tempfile::TempDir;

use crate::fixtures::{real_probe, TestRepo};
use crate::require_git;

#[tokio::test]
async fn test_linked_worktree_is_listed_after_main() -> Result<()> {
    require_git!();
    // GIVEN: A repository with one linked worktree on a new branch
    let repo = TestRepo::new()?;
    let parent = TempDir::new()?;
    let linked = repo.add_worktree(parent.path(), "feature-wt", "feature/login")?;

    // WHEN: Probing the main checkout
    let report = real_probe().await?.probe_path(repo.path()).await?;

    // THEN: Main comes first, then the linked worktree
    assert_eq!(report.worktrees.len(), 2);
    let main = &report.worktrees[0];
    assert!(main.is_main);
    assert_eq!(main.path, repo.path());
    assert_eq!(main.branch_name.as_deref(), Some("main"));

    let feature = &report.worktrees[1];
    assert!(!feature.is_main);
    assert_eq!(feature.path, linked);
    assert_eq!(feature.branch_name.as_deref(), Some("feature/login"));
    assert_eq!(feature.head_commit_sha, main.head_commit_sha);
    assert!(!feature.is_detached);
    assert!(!feature.has_uncommitted_changes);
    Ok(())
}

#[tokio::test]
async fn test_dirty_linked_worktree_is_flagged_independently() -> Result<()> {
    require_git!();
    // GIVEN: A clean main checkout and a linked worktree with an untracked file
    let repo = TestRepo::new()?;
    let parent = TempDir::new()?;
    let linked = repo.add_worktree(parent.path(), "wip", "wip")?;
    std::fs::write(linked.join("notes.txt"), "todo\n")?;

    // WHEN: Probing
    let report = real_probe().await?.probe_path(repo.path()).await?;

    // THEN: Only the linked worktree is dirty
    assert!(!report.state.is_dirty());
    assert!(!report.worktrees[0].has_uncommitted_changes);
    assert!(report.worktrees[1].has_uncommitted_changes);
    Ok(())
}

#[tokio::test]
async fn test_probing_from_linked_worktree_reports_its_own_branch() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    let parent = TempDir::new()?;
    let linked = repo.add_worktree(parent.path(), "hotfix", "hotfix")?;

    let report = real_probe().await?.probe_path(&linked).await?;

    assert_eq!(report.state.branch_name.as_deref(), Some("hotfix"));
    // The main checkout is still listed first
    assert!(report.worktrees[0].is_main);
    assert_eq!(report.worktrees[0].path, repo.path());
    assert!(report.worktrees.iter().any(|w| w.path == linked));
    Ok(())
}
