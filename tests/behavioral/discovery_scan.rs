// ABOUTME: Behavioral tests for project discovery reading editor and agent manifests
// that point at real git repositories.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use gitbar::discovery::{DiscoveryRoot, ProjectDiscovery};
use gitbar::models::ProjectSource;

use crate::fixtures::{real_probe, TestRepo};
use crate::require_git;

fn claude_session(root: &Path, slug: &str, cwd: &Path) -> Result<()> {
    let dir = root.join(slug);
    std::fs::create_dir_all(&dir)?;
    let lines = [
        serde_json::json!({ "type": "summary" }),
        serde_json::json!({ "type": "user", "cwd": cwd }),
    ];
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    std::fs::write(dir.join("0001.jsonl"), body)?;
    Ok(())
}

fn vscode_workspace(root: &Path, hash: &str, folder: &Path) -> Result<()> {
    let dir = root.join(hash);
    std::fs::create_dir_all(&dir)?;
    let url = url::Url::from_file_path(folder).map_err(|()| anyhow::anyhow!("not absolute"))?;
    std::fs::write(
        dir.join("workspace.json"),
        serde_json::json!({ "folder": url.as_str() }).to_string(),
    )?;
    Ok(())
}

#[tokio::test]
async fn test_manifests_resolve_to_repository_roots() -> Result<()> {
    require_git!();
    // GIVEN: Two repositories, one referenced by an agent session and one by
    // an editor workspace opened on a subdirectory
    let api = TestRepo::new()?;
    let web = TestRepo::new()?;
    let web_src = web.path().join("src");
    std::fs::create_dir_all(&web_src)?;

    let home = TempDir::new()?;
    let claude_root = home.path().join("claude");
    let vscode_root = home.path().join("vscode");
    claude_session(&claude_root, "-work-api", api.path())?;
    vscode_workspace(&vscode_root, "f00d", &web_src)?;

    // GIVEN: A manifest pointing at a plain directory
    let plain = TempDir::new()?;
    vscode_workspace(&vscode_root, "beef", plain.path())?;

    let prober = Arc::new(real_probe().await?);
    let discovery = ProjectDiscovery::new(prober).with_roots(vec![
        DiscoveryRoot::new(ProjectSource::ClaudeCode, claude_root.to_string_lossy()),
        DiscoveryRoot::new(ProjectSource::VsCode, vscode_root.to_string_lossy()),
    ]);

    // WHEN: Scanning
    let result = discovery.scan().await;

    // THEN: Both repositories are found at their roots, the plain directory is not
    assert_eq!(result.projects.len(), 2, "{:?}", result.projects);
    let api_project = result
        .projects
        .iter()
        .find(|p| p.path == api.path())
        .expect("api repository discovered");
    assert_eq!(api_project.source, ProjectSource::ClaudeCode);

    let web_project = result
        .projects
        .iter()
        .find(|p| p.path == web.path())
        .expect("web repository discovered at its root");
    assert_eq!(web_project.source, ProjectSource::VsCode);
    assert!(result.projects.iter().all(|p| !p.path.starts_with(plain.path())));
    Ok(())
}

#[tokio::test]
async fn test_missing_roots_yield_nothing() -> Result<()> {
    require_git!();
    let home = TempDir::new()?;
    let prober = Arc::new(real_probe().await?);
    let discovery = ProjectDiscovery::new(prober).with_roots(vec![DiscoveryRoot::new(
        ProjectSource::ClaudeCode,
        home.path().join("absent").to_string_lossy(),
    )]);

    let result = discovery.scan().await;

    assert!(result.projects.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_manifest_for_missing_checkout_is_reported_unreachable() -> Result<()> {
    require_git!();
    // GIVEN: A session manifest for a checkout that has since disappeared
    let home = TempDir::new()?;
    let gone = home.path().join("external").join("app");
    let claude_root = home.path().join("claude");
    claude_session(&claude_root, "-external-app", &gone)?;

    let prober = Arc::new(real_probe().await?);
    let discovery = ProjectDiscovery::new(prober).with_roots(vec![DiscoveryRoot::new(
        ProjectSource::ClaudeCode,
        claude_root.to_string_lossy(),
    )]);

    // WHEN: Scanning
    let result = discovery.scan().await;

    // THEN: The checkout is listed as unreachable rather than silently dropped
    assert!(result.projects.is_empty());
    assert_eq!(result.unreachable, vec![gone]);
    Ok(())
}
