// ABOUTME: Behavioral tests for repository probing against real git repositories
// in temporary directories.

use anyhow::Result;
use tempfile::TempDir;

use gitbar::git::ProbeError;

use crate::fixtures::{git, real_probe, TestRepo};
use crate::require_git;

#[tokio::test]
async fn test_clean_repository_reports_branch_and_head() -> Result<()> {
    require_git!();
    // GIVEN: A repository with one commit and no remote
    let repo = TestRepo::new()?;
    let probe = real_probe().await?;

    // WHEN: Probing it
    let report = probe.probe_path(repo.path()).await?;

    // THEN: Branch, head and counts describe a clean checkout
    let state = &report.state;
    assert_eq!(state.path, repo.path());
    assert_eq!(state.branch_name.as_deref(), Some("main"));
    assert!(!state.is_detached);
    assert!(!state.has_remote);
    assert_eq!((state.ahead_count, state.behind_count), (0, 0));
    assert!(!state.is_dirty());
    assert_eq!(state.head_commit_sha.as_deref(), Some(repo.head()?.as_str()));
    assert!(state.has_been_refreshed());
    assert!(state.last_error.is_none());

    // THEN: The main worktree is reported and the commit is counted
    assert_eq!(report.worktrees.len(), 1);
    assert!(report.worktrees[0].is_main);
    assert_eq!(report.worktrees[0].path, repo.path());
    assert!(!report.worktrees[0].has_uncommitted_changes);
    assert_eq!(report.activity.total(), 1);
    Ok(())
}

#[tokio::test]
async fn test_ahead_behind_staged_and_untracked() -> Result<()> {
    require_git!();
    // GIVEN: main is two commits ahead and one behind origin/main
    let repo = TestRepo::new()?;
    let remote = repo.with_remote()?;
    remote.push_upstream_commit("upstream.txt")?;
    git(repo.path(), &["fetch", "--quiet", "origin"])?;
    repo.add_commit("one.txt", "1\n", "Local one")?;
    repo.add_commit("two.txt", "2\n", "Local two")?;

    // GIVEN: One staged file and one untracked file
    repo.stage("staged.txt", "staged\n")?;
    repo.write("scratch.txt", "untracked\n")?;

    // WHEN: Probing
    let report = real_probe().await?.probe_path(repo.path()).await?;

    // THEN: Every count matches what git reports
    let state = &report.state;
    assert!(state.has_remote);
    assert_eq!(state.ahead_count, 2);
    assert_eq!(state.behind_count, 1);
    assert_eq!(state.staged_count, 1);
    assert_eq!(state.unstaged_count, 0);
    assert_eq!(state.untracked_count, 1);
    assert!(report.worktrees[0].has_uncommitted_changes);

    // THEN: Only commits reachable from HEAD are counted
    assert_eq!(report.activity.total(), 3);
    Ok(())
}

#[tokio::test]
async fn test_modified_tracked_file_is_unstaged() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    repo.write("README.md", "# Changed\n")?;

    let state = real_probe().await?.probe_path(repo.path()).await?.state;

    assert_eq!(state.unstaged_count, 1);
    assert_eq!(state.staged_count, 0);
    assert_eq!(state.untracked_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_detached_head_has_no_branch() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    let head = repo.head()?;
    git(repo.path(), &["checkout", "--quiet", "--detach"])?;

    let state = real_probe().await?.probe_path(repo.path()).await?.state;

    assert!(state.is_detached);
    assert_eq!(state.branch_name, None);
    assert!(!state.has_remote);
    assert_eq!(state.head_commit_sha, Some(head));
    Ok(())
}

#[tokio::test]
async fn test_unborn_repository_probes_without_history() -> Result<()> {
    require_git!();
    // GIVEN: A fresh repository with an untracked file and no commits
    let repo = TestRepo::unborn()?;
    repo.write("draft.txt", "draft\n")?;

    let report = real_probe().await?.probe_path(repo.path()).await?;

    assert_eq!(report.state.branch_name.as_deref(), Some("main"));
    assert_eq!(report.state.head_commit_sha, None);
    assert_eq!(report.state.untracked_count, 1);
    assert_eq!(report.activity.total(), 0);
    Ok(())
}

#[tokio::test]
async fn test_plain_directory_is_not_a_repository() -> Result<()> {
    require_git!();
    let dir = TempDir::new()?;

    let error = real_probe().await?.probe_path(dir.path()).await.unwrap_err();

    assert!(
        matches!(error, ProbeError::NotAGitRepository { .. }),
        "unexpected error: {error}"
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_directory_is_unreachable() -> Result<()> {
    require_git!();
    let dir = TempDir::new()?;
    let missing = dir.path().join("gone");

    let error = real_probe().await?.probe_path(&missing).await.unwrap_err();

    assert_eq!(error, ProbeError::PathUnreachable { path: missing });
    Ok(())
}

#[tokio::test]
async fn test_probing_twice_gives_the_same_status() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    repo.stage("staged.txt", "x\n")?;
    let probe = real_probe().await?;

    let first = probe.probe_path(repo.path()).await?;
    let second = probe.probe_path(repo.path()).await?;

    assert!(first.state.same_status(&second.state));
    assert_eq!(first.worktrees, second.worktrees);
    assert_eq!(first.activity, second.activity);
    Ok(())
}

#[tokio::test]
async fn test_validate_from_subdirectory_returns_root() -> Result<()> {
    require_git!();
    let repo = TestRepo::new()?;
    let nested = repo.path().join("src").join("deep");
    std::fs::create_dir_all(&nested)?;

    let root = real_probe().await?.validate_path(&nested).await?;

    assert_eq!(root, repo.path());
    Ok(())
}

#[tokio::test]
async fn test_nested_checkout_without_git_dir_is_not_reported_as_parent() -> Result<()> {
    require_git!();
    // GIVEN: A repository checked out inside another repository
    let parent = TestRepo::new()?;
    let child = parent.path().join("child");
    std::fs::create_dir_all(&child)?;
    git(&child, &["init", "--quiet"])?;
    git(&child, &["symbolic-ref", "HEAD", "refs/heads/trunk"])?;
    std::fs::write(child.join("lib.rs"), "// child\n")?;
    git(&child, &["add", "lib.rs"])?;
    git(&child, &["commit", "--quiet", "-m", "Child commit"])?;
    let probe = real_probe().await?;

    let before = probe.probe_path(&child).await?;
    assert_eq!(before.state.branch_name.as_deref(), Some("trunk"));

    // WHEN: The child's .git directory is deleted
    std::fs::remove_dir_all(child.join(".git"))?;
    let error = probe.probe_path(&child).await.unwrap_err();

    // THEN: The parent's status is not reported under the child's path
    assert_eq!(error, ProbeError::NotAGitRepository { path: child });
    Ok(())
}
