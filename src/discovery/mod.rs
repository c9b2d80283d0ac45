// ABOUTME: Finds candidate projects in editor and agent manifests and validates they are git working trees
//
// Each root is scanned one level deep; every subdirectory is one manifest. Roots that
// do not exist are skipped silently, and a broken manifest only drops that candidate.

pub mod manifest;

use futures_util::future::BoxFuture;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::git::RepositoryProber;
use crate::models::{display_name_for, DiscoveredProject, ProjectSource};

/// Problems met while scanning one root or manifest
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },
}

/// A directory of manifests for one source. `~/` expands to the home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRoot {
    pub source: ProjectSource,
    pub path_template: String,
}

impl DiscoveryRoot {
    pub fn new(source: ProjectSource, path_template: impl Into<String>) -> Self {
        Self {
            source,
            path_template: path_template.into(),
        }
    }

    /// Built-in roots, in priority order
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(ProjectSource::ClaudeCode, "~/.claude/projects"),
            Self::new(ProjectSource::VsCode, "~/.config/Code/User/workspaceStorage"),
            Self::new(
                ProjectSource::VsCode,
                "~/Library/Application Support/Code/User/workspaceStorage",
            ),
        ]
    }

    /// Concrete path; `None` when the template needs a home directory we do not have
    pub fn resolve(&self, home: Option<&Path>) -> Option<PathBuf> {
        match self.path_template.strip_prefix("~/") {
            Some(rest) => home.map(|h| h.join(rest)),
            None => Some(PathBuf::from(&self.path_template)),
        }
    }
}

/// Outcome of one discovery pass
#[derive(Debug, Default)]
pub struct ScanResult {
    pub projects: Vec<DiscoveredProject>,
    /// Paths a manifest still names but that cannot be reached right now
    pub unreachable: Vec<PathBuf>,
    pub errors: Vec<DiscoveryError>,
}

/// What a pass hands to the scheduler for reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryPass {
    pub projects: Vec<DiscoveredProject>,
    /// Already-tracked projects under these paths are kept, not dropped
    pub unreachable: Vec<PathBuf>,
}

impl From<ScanResult> for DiscoveryPass {
    fn from(result: ScanResult) -> Self {
        Self {
            projects: result.projects,
            unreachable: result.unreachable,
        }
    }
}

/// Seam between the scheduler and discovery
#[cfg_attr(test, mockall::automock)]
pub trait ProjectDiscoverer: Send + Sync {
    fn discover(&self) -> BoxFuture<'static, DiscoveryPass>;
}

/// Where a manifest's path stands on disk
#[derive(Debug, PartialEq, Eq)]
enum Candidate {
    /// Root of a working tree
    Root(PathBuf),
    /// Inside a working tree; git still has to resolve the root
    Nested(PathBuf),
    Unreachable(PathBuf),
    /// Exists, but no repository contains it
    Plain(PathBuf),
}

/// Discovery over the built-in manifest roots
#[derive(Clone)]
pub struct ProjectDiscovery {
    roots: Vec<DiscoveryRoot>,
    home: Option<PathBuf>,
    prober: Arc<dyn RepositoryProber>,
}

impl ProjectDiscovery {
    /// `prober` resolves candidates that sit inside a repository rather than at its root
    pub fn new(prober: Arc<dyn RepositoryProber>) -> Self {
        Self {
            roots: DiscoveryRoot::defaults(),
            home: dirs::home_dir(),
            prober,
        }
    }

    #[must_use]
    pub fn with_roots(mut self, roots: Vec<DiscoveryRoot>) -> Self {
        self.roots = roots;
        self
    }

    #[must_use]
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn roots(&self) -> &[DiscoveryRoot] {
        &self.roots
    }

    /// Scan every root, validate candidates, dedupe by canonical path and sort by name
    pub async fn scan(&self) -> ScanResult {
        let roots: Vec<(ProjectSource, PathBuf)> = self
            .roots
            .iter()
            .filter_map(|root| root.resolve(self.home.as_deref()).map(|p| (root.source, p)))
            .collect();

        let scanned = tokio::task::spawn_blocking(move || {
            let (candidates, errors) = collect_candidates(&roots);
            let classified: Vec<(ProjectSource, Candidate)> = candidates
                .into_iter()
                .map(|(source, path)| (source, classify(&path)))
                .collect();
            (classified, errors)
        })
        .await;
        let (candidates, errors) = match scanned {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Discovery scan task failed");
                return ScanResult::default();
            }
        };

        let mut seen = HashSet::new();
        let mut projects = Vec::new();
        let mut unreachable = Vec::new();
        for (source, candidate) in candidates {
            let path = match candidate {
                Candidate::Root(path) => path,
                Candidate::Nested(path) => match self.prober.validate(path.clone()).await {
                    Ok(toplevel) => toplevel,
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "Could not resolve repository root");
                        continue;
                    }
                },
                Candidate::Unreachable(path) => {
                    debug!(path = %path.display(), source = %source, "Discovery candidate is unreachable");
                    if !unreachable.contains(&path) {
                        unreachable.push(path);
                    }
                    continue;
                }
                Candidate::Plain(path) => {
                    debug!(path = %path.display(), source = %source, "Discovery candidate is not a git working tree");
                    continue;
                }
            };
            if !seen.insert(path.clone()) {
                continue;
            }
            projects.push(DiscoveredProject {
                display_name: display_name_for(&path),
                path,
                source,
            });
        }

        projects.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.path.cmp(&b.path)));

        for error in &errors {
            warn!(error = %error, "Discovery manifest skipped");
        }
        info!(
            projects = projects.len(),
            unreachable = unreachable.len(),
            errors = errors.len(),
            "Discovery pass complete"
        );

        ScanResult {
            projects,
            unreachable,
            errors,
        }
    }
}

impl ProjectDiscoverer for ProjectDiscovery {
    fn discover(&self) -> BoxFuture<'static, DiscoveryPass> {
        let discovery = self.clone();
        Box::pin(async move { discovery.scan().await.into() })
    }
}

/// Cheap filesystem check of one candidate; runs on the blocking pool
fn classify(candidate: &Path) -> Candidate {
    let Ok(path) = fs::canonicalize(candidate) else {
        return Candidate::Unreachable(candidate.to_path_buf());
    };
    if !path.is_dir() {
        Candidate::Plain(path)
    } else if path.join(".git").exists() {
        Candidate::Root(path)
    } else if path.ancestors().skip(1).any(|a| a.join(".git").exists()) {
        Candidate::Nested(path)
    } else {
        Candidate::Plain(path)
    }
}

/// Read every manifest under every root; candidates keep root order
fn collect_candidates(roots: &[(ProjectSource, PathBuf)]) -> (Vec<(ProjectSource, PathBuf)>, Vec<DiscoveryError>) {
    let mut candidates = Vec::new();
    let mut errors = Vec::new();

    for (source, root) in roots {
        if !root.is_dir() {
            debug!(root = %root.display(), "Discovery root not present, skipping");
            continue;
        }

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(source_err) => {
                errors.push(DiscoveryError::Unreadable {
                    path: root.clone(),
                    source: source_err,
                });
                continue;
            }
        };

        let mut dirs: Vec<PathBuf> = entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()).collect();
        dirs.sort();

        for dir in dirs {
            match manifest::read_project_path(*source, &dir) {
                Ok(Some(path)) => candidates.push((*source, path)),
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
    }

    (candidates, errors)
}
