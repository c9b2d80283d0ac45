// ABOUTME: Coordinator task that owns every tracked project and serializes all state changes
// ABOUTME: Probes, timers and discovery report back through channels; nothing else mutates project state

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::ProjectSnapshot;
use crate::config::EngineConfig;
use crate::discovery::{DiscoveryPass, ProjectDiscoverer};
use crate::git::{ProbeError, ProbeReport, RepositoryProber};
use crate::models::{ProjectSource, TrackedProject};

/// Requests from `PollingScheduler` handles
#[derive(Debug)]
pub(super) enum Command {
    Add {
        project: TrackedProject,
        reply: oneshot::Sender<TrackedProject>,
    },
    Remove {
        id: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    Refresh {
        id: PathBuf,
        reply: oneshot::Sender<bool>,
    },
    Reconcile {
        pass: DiscoveryPass,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Notifications from tasks the coordinator spawned
#[derive(Debug)]
pub(super) enum Event {
    TimerFired {
        id: PathBuf,
        generation: u64,
    },
    ProbeCompleted {
        id: PathBuf,
        seq: u64,
        outcome: Result<ProbeReport, ProbeError>,
    },
    Discovered(DiscoveryPass),
}

/// Per-project bookkeeping that never leaves the coordinator
struct ProjectSlot {
    project: TrackedProject,
    /// Sequence number of the running probe; `Some` means the project is probing
    in_flight: Option<u64>,
    last_applied: u64,
    refresh_pending: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every re-arm so a stale timer cannot fire a probe
    timer_generation: u64,
}

impl ProjectSlot {
    const fn new(project: TrackedProject) -> Self {
        Self {
            project,
            in_flight: None,
            last_applied: 0,
            refresh_pending: false,
            timer: None,
            timer_generation: 0,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub(super) struct Coordinator {
    config: EngineConfig,
    prober: Arc<dyn RepositoryProber>,
    semaphore: Arc<Semaphore>,
    slots: HashMap<PathBuf, ProjectSlot>,
    next_seq: u64,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<Event>,
    snapshots: watch::Sender<ProjectSnapshot>,
    probes: JoinSet<()>,
    discovery_task: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub(super) fn new(
        config: EngineConfig,
        prober: Arc<dyn RepositoryProber>,
        events_tx: mpsc::UnboundedSender<Event>,
        snapshots: watch::Sender<ProjectSnapshot>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_probes));
        Self {
            config,
            prober,
            semaphore,
            slots: HashMap::new(),
            next_seq: 0,
            next_generation: 0,
            events_tx,
            snapshots,
            probes: JoinSet::new(),
            discovery_task: None,
        }
    }

    /// Run discovery on its own interval, independent of probe timers
    pub(super) fn start_discovery(&mut self, discoverer: Arc<dyn ProjectDiscoverer>) {
        let events = self.events_tx.clone();
        let period = self.config.discovery_interval;

        self.discovery_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let pass = discoverer.discover().await;
                debug!(
                    projects = pass.projects.len(),
                    unreachable = pass.unreachable.len(),
                    "Scheduled discovery pass finished"
                );
                if events.send(Event::Discovered(pass)).is_err() {
                    break;
                }
            }
        }));
    }

    pub(super) async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        info!(max_concurrent = self.config.max_concurrent_probes, "Scheduler started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All scheduler handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
                Some(joined) = self.probes.join_next(), if !self.probes.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Probe task ended abnormally");
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Apply a command and publish before replying, so callers observe its effect
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Add { project, reply } => {
                let tracked = self.add(project);
                self.publish();
                let _ = reply.send(tracked);
            }
            Command::Remove { id, reply } => {
                let removed = self.remove(&id);
                self.publish();
                let _ = reply.send(removed);
            }
            Command::Refresh { id, reply } => {
                let known = self.refresh(&id);
                self.publish();
                let _ = reply.send(known);
            }
            Command::Reconcile { pass, reply } => {
                self.reconcile(pass);
                self.publish();
                let _ = reply.send(());
            }
            // handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::TimerFired { id, generation } => self.timer_fired(&id, generation),
            Event::ProbeCompleted { id, seq, outcome } => self.complete(&id, seq, outcome),
            Event::Discovered(pass) => self.reconcile(pass),
        }
        self.publish();
    }

    fn add(&mut self, project: TrackedProject) -> TrackedProject {
        let id = project.id.clone();
        if let Some(slot) = self.slots.get_mut(&id) {
            if project.source == ProjectSource::Manual && slot.project.source != ProjectSource::Manual {
                info!(path = %id.display(), from = %slot.project.source, "Promoting discovered project to manual");
                slot.project.source = ProjectSource::Manual;
            }
            return slot.project.clone();
        }

        info!(path = %id.display(), source = %project.source, "Tracking project");
        let mut tracked = project.clone();
        tracked.is_refreshing = true;
        self.slots.insert(id.clone(), ProjectSlot::new(project));
        self.start_probe(&id);
        tracked
    }

    fn remove(&mut self, id: &Path) -> bool {
        let Some(mut slot) = self.slots.remove(id) else {
            return false;
        };
        slot.cancel_timer();
        info!(path = %id.display(), probing = slot.in_flight.is_some(), "Stopped tracking project");
        true
    }

    fn refresh(&mut self, id: &Path) -> bool {
        let Some(slot) = self.slots.get_mut(id) else {
            return false;
        };
        if slot.in_flight.is_some() {
            debug!(path = %id.display(), "Refresh coalesced into in-flight probe");
            slot.refresh_pending = true;
        } else {
            self.start_probe(id);
        }
        true
    }

    /// Add new discovered projects, drop discovered ones no longer reported, never touch manual ones.
    /// A discovered project under an unreachable path stays tracked and keeps failing its probes.
    fn reconcile(&mut self, pass: DiscoveryPass) {
        let DiscoveryPass { projects: discovered, unreachable } = pass;
        let reported: HashSet<PathBuf> = discovered.iter().map(|d| d.path.clone()).collect();
        let offline = |id: &Path| unreachable.iter().any(|path| path.starts_with(id));

        let stale: Vec<PathBuf> = self
            .slots
            .iter()
            .filter(|(id, slot)| {
                slot.project.source.is_discovered() && !reported.contains(*id) && !offline(id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.remove(id);
        }

        let mut added = 0usize;
        for candidate in discovered {
            if self.slots.contains_key(&candidate.path) {
                continue;
            }
            let id = candidate.path.clone();
            self.slots
                .insert(id.clone(), ProjectSlot::new(TrackedProject::from_discovered(&candidate)));
            self.start_probe(&id);
            added += 1;
        }

        if added > 0 || !stale.is_empty() {
            info!(added = added, removed = stale.len(), "Reconciled discovered projects");
        }
    }

    fn timer_fired(&mut self, id: &Path, generation: u64) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        if slot.timer_generation != generation {
            return;
        }
        slot.timer = None;
        if slot.in_flight.is_some() {
            // the completion re-arms the timer
            return;
        }
        self.start_probe(id);
    }

    fn start_probe(&mut self, id: &Path) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        if slot.in_flight.is_some() {
            return;
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        slot.cancel_timer();
        slot.in_flight = Some(seq);
        slot.project.is_refreshing = true;

        let id = id.to_path_buf();
        let prober = Arc::clone(&self.prober);
        let semaphore = Arc::clone(&self.semaphore);
        let events = self.events_tx.clone();

        self.probes.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                debug!(path = %id.display(), seq = seq, "Probe cancelled before it started");
                return;
            };
            debug!(path = %id.display(), seq = seq, "Probe started");
            let outcome = match AssertUnwindSafe(async { prober.probe(id.clone()).await })
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(path = %id.display(), seq = seq, "Probe panicked");
                    Err(ProbeError::Aborted { path: id.clone() })
                }
            };
            let _ = events.send(Event::ProbeCompleted { id, seq, outcome });
        });
    }

    fn complete(&mut self, id: &Path, seq: u64, outcome: Result<ProbeReport, ProbeError>) {
        let Some(slot) = self.slots.get_mut(id) else {
            debug!(path = %id.display(), seq = seq, "Discarding result for untracked project");
            return;
        };
        if slot.in_flight != Some(seq) || seq <= slot.last_applied {
            debug!(path = %id.display(), seq = seq, "Discarding stale probe result");
            return;
        }

        slot.in_flight = None;
        slot.last_applied = seq;
        slot.project.is_refreshing = false;

        match outcome {
            Ok(report) => {
                if slot.project.consecutive_failures > 0 {
                    info!(path = %id.display(), "Project recovered");
                }
                slot.project.state = report.state;
                slot.project.worktrees = report.worktrees;
                slot.project.activity = report.activity;
                slot.project.consecutive_failures = 0;
            }
            Err(error) => {
                slot.project.consecutive_failures = slot.project.consecutive_failures.saturating_add(1);
                warn!(
                    path = %id.display(),
                    seq = seq,
                    failures = slot.project.consecutive_failures,
                    error = %error,
                    "Probe failed"
                );
                slot.project.state.last_error = Some(error);
            }
        }

        if slot.refresh_pending {
            slot.refresh_pending = false;
            self.start_probe(id);
        } else {
            let delay = self.config.next_delay(slot.project.consecutive_failures);
            self.arm_timer(id, delay);
        }
    }

    fn arm_timer(&mut self, id: &Path, delay: Duration) {
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        slot.cancel_timer();
        self.next_generation += 1;
        let generation = self.next_generation;
        slot.timer_generation = generation;

        let events = self.events_tx.clone();
        let id = id.to_path_buf();
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::TimerFired { id, generation });
        }));
    }

    fn publish(&self) {
        let snapshot: BTreeMap<PathBuf, TrackedProject> = self
            .slots
            .iter()
            .map(|(id, slot)| (id.clone(), slot.project.clone()))
            .collect();
        self.snapshots.send_replace(Arc::new(snapshot));
    }

    /// Stop timers and discovery, cancel queued probes and wait for running ones
    async fn shutdown(&mut self) {
        info!(in_flight = self.probes.len(), "Scheduler shutting down");

        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }
        for slot in self.slots.values_mut() {
            slot.cancel_timer();
        }
        self.semaphore.close();

        while let Some(result) = self.probes.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Probe task ended abnormally");
            }
        }

        for slot in self.slots.values_mut() {
            slot.in_flight = None;
            slot.refresh_pending = false;
            slot.project.is_refreshing = false;
        }
        self.publish();
    }
}
