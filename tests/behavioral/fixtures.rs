// ABOUTME: Shared test fixtures and utilities for behavioral tests
//
// Provides:
// - TestRepo: Temporary git repository with an initial commit
// - TestRemote: Bare repository acting as `origin`, plus a second clone to push from
// - git_available(): Check if git is installed
// - require_git!(): Skip test if git unavailable

#![allow(dead_code)]

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use gitbar::git::RepositoryProbe;
use gitbar::process::{GitTool, ProcessRunner};

/// Run git with a fixed identity so commits work on unconfigured machines
pub fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=Test User",
            "-c",
            "user.email=test@test.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Creates a temporary git repository on branch `main` with an initial commit
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let repo = Self::unborn()?;
        repo.add_commit("README.md", "# Test Repo\n", "Initial commit")?;
        Ok(repo)
    }

    /// Repository with no commits yet
    pub fn unborn() -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().canonicalize()?;

        git(&path, &["init", "--quiet"])?;
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a file and commit it
    pub fn add_commit(&self, filename: &str, content: &str, message: &str) -> Result<()> {
        std::fs::write(self.path.join(filename), content)?;
        git(&self.path, &["add", filename])?;
        git(&self.path, &["commit", "--quiet", "-m", message])?;
        Ok(())
    }

    /// Write a file and stage it without committing
    pub fn stage(&self, filename: &str, content: &str) -> Result<()> {
        std::fs::write(self.path.join(filename), content)?;
        git(&self.path, &["add", filename])?;
        Ok(())
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<()> {
        std::fs::write(self.path.join(filename), content)?;
        Ok(())
    }

    pub fn head(&self) -> Result<String> {
        git(&self.path, &["rev-parse", "HEAD"])
    }

    /// Add a linked worktree on a new branch; returns its canonical path
    pub fn add_worktree(&self, parent: &Path, name: &str, branch: &str) -> Result<PathBuf> {
        let target = parent.join(name);
        let target_str = target.to_string_lossy().to_string();
        git(&self.path, &["worktree", "add", "--quiet", "-b", branch, &target_str])?;
        Ok(target.canonicalize()?)
    }

    /// Attach a bare `origin` and push `main` with upstream tracking
    pub fn with_remote(&self) -> Result<TestRemote> {
        let bare_dir = TempDir::new()?;
        let bare = bare_dir.path().canonicalize()?;
        git(&bare, &["init", "--quiet", "--bare"])?;
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"])?;

        let bare_str = bare.to_string_lossy().to_string();
        git(&self.path, &["remote", "add", "origin", &bare_str])?;
        git(&self.path, &["push", "--quiet", "-u", "origin", "main"])?;

        let clone_dir = TempDir::new()?;
        let clone = clone_dir.path().join("clone");
        let clone_str = clone.to_string_lossy().to_string();
        git(clone_dir.path(), &["clone", "--quiet", &bare_str, &clone_str])?;

        Ok(TestRemote {
            _bare: bare_dir,
            _clone_dir: clone_dir,
            clone,
        })
    }
}

/// Bare remote plus an independent clone used to create upstream commits
pub struct TestRemote {
    _bare: TempDir,
    _clone_dir: TempDir,
    pub clone: PathBuf,
}

impl TestRemote {
    /// Commit in the second clone and push, so the first repo falls behind after fetching
    pub fn push_upstream_commit(&self, filename: &str) -> Result<()> {
        std::fs::write(self.clone.join(filename), "upstream\n")?;
        git(&self.clone, &["add", filename])?;
        git(&self.clone, &["commit", "--quiet", "-m", "Upstream change"])?;
        git(&self.clone, &["push", "--quiet", "origin", "HEAD:main"])?;
        Ok(())
    }
}

/// Check if git is available on the system
pub fn git_available() -> bool {
    Command::new("git")
        .args(["--version"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Macro to skip test if git is not available
#[macro_export]
macro_rules! require_git {
    () => {
        if !$crate::fixtures::git_available() {
            eprintln!("Skipping test: git not available");
            return Ok(());
        }
    };
}

/// Probe backed by the real git binary
pub async fn real_probe() -> Result<RepositoryProbe> {
    let tool = GitTool::locate("git").await?;
    Ok(RepositoryProbe::new(
        Arc::new(ProcessRunner::for_git()),
        &tool,
        Duration::from_secs(30),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_creation() -> Result<()> {
        require_git!();
        let repo = TestRepo::new()?;
        assert!(repo.path().join(".git").exists());
        assert!(repo.path().join("README.md").exists());
        assert_eq!(git(repo.path(), &["branch", "--show-current"])?, "main");
        Ok(())
    }

    #[test]
    fn test_remote_tracking_is_configured() -> Result<()> {
        require_git!();
        let repo = TestRepo::new()?;
        let _remote = repo.with_remote()?;
        assert_eq!(
            git(repo.path(), &["rev-parse", "--abbrev-ref", "main@{upstream}"])?,
            "origin/main"
        );
        Ok(())
    }
}
