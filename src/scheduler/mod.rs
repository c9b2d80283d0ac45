// ABOUTME: Polling scheduler that keeps every tracked project's status fresh
// ABOUTME: Public handle over a single coordinator task; observers read immutable snapshots

//! Polling scheduler for tracked repositories.
//!
//! Every project cycles `Idle -> Probing -> Idle`. A timer or a manual refresh starts
//! a probe; a refresh that arrives while probing is coalesced into exactly one
//! follow-up probe. All probes share one semaphore, so no more than
//! `max_concurrent_probes` probes run at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  Command   ┌─────────────────────────────┐
//! │ PollingScheduler │───────────▶│        Coordinator          │
//! │     (handle)     │            │  owns HashMap<id, slot>     │
//! └──────────────────┘            │                             │
//!          ▲                      │  ┌─────────┐  ┌──────────┐  │
//!          │ watch<Snapshot>      │  │ timers  │  │ discovery│  │
//!          └──────────────────────│  └────┬────┘  └────┬─────┘  │
//!                                 │       │ Event      │ Event  │
//!                                 │       ▼            ▼        │
//!                                 │  ┌───────────────────────┐  │
//!                                 │  │ probe tasks (permits) │  │
//!                                 │  └───────────────────────┘  │
//!                                 └─────────────────────────────┘
//! ```
//!
//! Results carry a scheduler-wide sequence number. Only the result matching a
//! project's in-flight sequence is applied, so a late answer for a removed project
//! or a superseded probe is dropped.
//!
//! # Usage
//!
//! ```ignore
//! let scheduler = PollingScheduler::start(&EngineConfig::load()?).await?;
//! scheduler.add_project("/home/me/code/app").await?;
//! let mut updates = scheduler.subscribe();
//! while updates.changed().await.is_ok() {
//!     render(&updates.borrow());
//! }
//! scheduler.shutdown().await;
//! ```

mod coordinator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::discovery::{ProjectDiscoverer, ProjectDiscovery};
use crate::git::{ProbeError, RepositoryProbe, RepositoryProber};
use crate::models::{display_name_for, DiscoveredProject, ProjectSource, TrackedProject};
use crate::process::{GitTool, ProcessRunner, ToolError};
use coordinator::{Command, Coordinator};

/// Immutable view of every tracked project, keyed by id
pub type ProjectSnapshot = Arc<BTreeMap<PathBuf, TrackedProject>>;

/// Errors returned by the scheduler's public interface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("git is unavailable: {0}")]
    ToolUnavailable(#[from] ToolError),

    #[error("Cannot track {}: {reason}", .path.display())]
    InvalidProject { path: PathBuf, reason: ProbeError },

    #[error("Project is not tracked: {}", .0.display())]
    UnknownProject(PathBuf),

    #[error("Scheduler has stopped")]
    Stopped,
}

/// Handle to a running scheduler
pub struct PollingScheduler {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ProjectSnapshot>,
    prober: Arc<dyn RepositoryProber>,
    discoverer: Option<Arc<dyn ProjectDiscoverer>>,
    coordinator: JoinHandle<()>,
}

impl PollingScheduler {
    /// Locate git, then start probing and (when enabled) discovery.
    ///
    /// Fails with `ToolUnavailable` before any project is probed when git cannot be run.
    pub async fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        let tool = GitTool::locate(&config.git_binary).await?;

        let prober: Arc<dyn RepositoryProber> = Arc::new(RepositoryProbe::new(
            Arc::new(ProcessRunner::for_git()),
            &tool,
            config.process_timeout,
        ));
        let discoverer: Option<Arc<dyn ProjectDiscoverer>> = if config.discovery_enabled {
            Some(Arc::new(ProjectDiscovery::new(Arc::clone(&prober))))
        } else {
            None
        };

        info!(
            discovery = config.discovery_enabled,
            timeout_secs = config.process_timeout.as_secs(),
            "Starting scheduler"
        );
        Ok(Self::spawn(config.clone(), prober, discoverer))
    }

    /// Start the coordinator with explicit collaborators
    pub fn spawn(
        config: EngineConfig,
        prober: Arc<dyn RepositoryProber>,
        discoverer: Option<Arc<dyn ProjectDiscoverer>>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ProjectSnapshot::default());

        let mut coordinator = Coordinator::new(config, Arc::clone(&prober), events_tx, snapshot_tx);
        if let Some(discoverer) = &discoverer {
            coordinator.start_discovery(Arc::clone(discoverer));
        }
        let coordinator = tokio::spawn(coordinator.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshot_rx,
            prober,
            discoverer,
            coordinator,
        }
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ProjectSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> ProjectSnapshot {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn project(&self, id: &Path) -> Option<TrackedProject> {
        self.snapshot().get(id).cloned()
    }

    /// Validate `path` as a git working tree and track its root as a manual project
    pub async fn add_project(&self, path: impl AsRef<Path>) -> Result<TrackedProject, EngineError> {
        let path = path.as_ref().to_path_buf();
        let root = self
            .prober
            .validate(path.clone())
            .await
            .map_err(|reason| EngineError::InvalidProject { path, reason })?;

        let project = TrackedProject::new(root.clone(), display_name_for(&root), ProjectSource::Manual);
        self.request(|reply| Command::Add { project, reply }).await
    }

    /// Track a configured project even when it cannot be validated right now.
    ///
    /// A path that fails validation is tracked as given; its probes fail with the same
    /// error and back off until the directory comes back.
    pub async fn track_project(&self, path: impl AsRef<Path>) -> Result<TrackedProject, EngineError> {
        let path = path.as_ref();
        let id = match self.prober.validate(path.to_path_buf()).await {
            Ok(root) => root,
            Err(reason) => {
                warn!(path = %path.display(), error = %reason, "Tracking project that failed validation");
                resolve_id(path).await
            }
        };

        let project = TrackedProject::new(id.clone(), display_name_for(&id), ProjectSource::Manual);
        self.request(|reply| Command::Add { project, reply }).await
    }

    pub async fn remove_project(&self, id: &Path) -> Result<(), EngineError> {
        let id = resolve_id(id).await;
        let removed = self
            .request(|reply| Command::Remove {
                id: id.clone(),
                reply,
            })
            .await?;
        if removed {
            Ok(())
        } else {
            Err(EngineError::UnknownProject(id))
        }
    }

    /// Probe now, or once more right after the probe already running
    pub async fn refresh(&self, id: &Path) -> Result<(), EngineError> {
        let id = resolve_id(id).await;
        let known = self
            .request(|reply| Command::Refresh {
                id: id.clone(),
                reply,
            })
            .await?;
        if known {
            Ok(())
        } else {
            Err(EngineError::UnknownProject(id))
        }
    }

    /// Run a discovery pass immediately and reconcile its result; returns what was found
    pub async fn run_discovery_now(&self) -> Result<Vec<DiscoveredProject>, EngineError> {
        let Some(discoverer) = &self.discoverer else {
            return Ok(Vec::new());
        };
        let pass = discoverer.discover().await;
        let found = pass.projects.clone();
        self.request(|reply| Command::Reconcile { pass, reply }).await?;
        Ok(found)
    }

    /// Stop timers and discovery, cancel queued probes and wait for running ones
    pub async fn shutdown(self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
        let _ = self.coordinator.await;
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(make(reply)).map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)
    }
}

/// Ids are canonical paths; fall back to the given path once it no longer exists
async fn resolve_id(id: &Path) -> PathBuf {
    tokio::fs::canonicalize(id).await.unwrap_or_else(|_| id.to_path_buf())
}
