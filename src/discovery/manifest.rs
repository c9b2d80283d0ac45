// ABOUTME: Readers for the per-source project manifests found under discovery roots

use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use url::Url;

use super::DiscoveryError;
use crate::models::ProjectSource;

/// Claude Code transcripts longer than this are not searched further for a `cwd`
const MAX_TRANSCRIPT_LINES: usize = 200;

/// Read the project path recorded in one manifest directory.
///
/// `Ok(None)` means the directory holds no usable manifest; that is normal
/// (empty session folders, multi-root or remote VS Code workspaces).
pub fn read_project_path(source: ProjectSource, dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
    match source {
        ProjectSource::ClaudeCode => claude_code_project(dir),
        ProjectSource::VsCode => vscode_project(dir),
        ProjectSource::Manual => Ok(None),
    }
}

#[derive(Deserialize)]
struct TranscriptRecord {
    cwd: Option<String>,
}

/// Newest `*.jsonl` transcript in `dir`, first record carrying a `cwd`
fn claude_code_project(dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
    let entries = fs::read_dir(dir).map_err(|source| DiscoveryError::Unreadable {
        path: dir.to_path_buf(),
        source,
    })?;

    let newest = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl") && p.is_file())
        .map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let Some((_, transcript)) = newest else {
        return Ok(None);
    };

    let file = File::open(&transcript).map_err(|source| DiscoveryError::Unreadable {
        path: transcript.clone(),
        source,
    })?;

    for line in BufReader::new(file).lines().take(MAX_TRANSCRIPT_LINES) {
        let line = line.map_err(|source| DiscoveryError::Unreadable {
            path: transcript.clone(),
            source,
        })?;
        // Partial or foreign lines are skipped; only a `cwd` matters
        let Ok(record) = serde_json::from_str::<TranscriptRecord>(&line) else {
            continue;
        };
        if let Some(cwd) = record.cwd.filter(|c| !c.is_empty()) {
            return Ok(Some(PathBuf::from(cwd)));
        }
    }

    Ok(None)
}

#[derive(Deserialize)]
struct WorkspaceManifest {
    folder: Option<String>,
}

/// `workspace.json` whose `folder` is a `file://` URL
fn vscode_project(dir: &Path) -> Result<Option<PathBuf>, DiscoveryError> {
    let manifest_path = dir.join("workspace.json");
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let content = fs::read_to_string(&manifest_path).map_err(|source| DiscoveryError::Unreadable {
        path: manifest_path.clone(),
        source,
    })?;
    let manifest: WorkspaceManifest =
        serde_json::from_str(&content).map_err(|e| DiscoveryError::InvalidManifest {
            path: manifest_path.clone(),
            reason: e.to_string(),
        })?;

    let Some(folder) = manifest.folder else {
        return Ok(None);
    };
    let url = Url::parse(&folder).map_err(|e| DiscoveryError::InvalidManifest {
        path: manifest_path.clone(),
        reason: format!("bad folder URL {folder:?}: {e}"),
    })?;
    if url.scheme() != "file" {
        return Ok(None);
    }

    url.to_file_path()
        .map(Some)
        .map_err(|()| DiscoveryError::InvalidManifest {
            path: manifest_path,
            reason: format!("folder URL is not a local path: {folder}"),
        })
}
