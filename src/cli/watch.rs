// ABOUTME: Watch command - runs the scheduler and prints every project whose status changes

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use super::util::status_row;
use super::{OutputFormat, WatchArgs};
use crate::config::{expand_home, EngineConfig};
use crate::models::TrackedProject;
use crate::scheduler::{PollingScheduler, ProjectSnapshot};

/// Execute the watch command
pub async fn execute(args: WatchArgs, format: OutputFormat, config: EngineConfig) -> Result<()> {
    let mut config = config;
    if args.no_discovery {
        config.discovery_enabled = false;
    }
    config.projects.extend(args.paths.iter().map(|p| expand_home(p)));

    let scheduler = PollingScheduler::start(&config)
        .await
        .context("Failed to start the status engine")?;

    // Configured projects stay tracked while unreachable and report their error
    for path in &config.projects {
        match scheduler.track_project(path).await {
            Ok(project) => info!(id = %project.id.display(), "Tracking project"),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping project");
                eprintln!("warning: {e}");
            }
        }
    }

    let mut updates = scheduler.subscribe();
    let mut shown: BTreeMap<PathBuf, TrackedProject> = BTreeMap::new();
    print_changes(&updates.borrow_and_update().clone(), &mut shown, format)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_changes(&snapshot, &mut shown, format)?;
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

/// Print projects that are new or whose observable status moved since last shown
fn print_changes(
    snapshot: &ProjectSnapshot,
    shown: &mut BTreeMap<PathBuf, TrackedProject>,
    format: OutputFormat,
) -> Result<()> {
    for (id, project) in snapshot.iter() {
        if !project.state.has_been_refreshed() && project.state.last_error.is_none() {
            continue;
        }
        let unchanged = shown.get(id).is_some_and(|previous| {
            previous.state.same_status(&project.state)
                && previous.state.last_error == project.state.last_error
                && previous.worktrees == project.worktrees
                && previous.activity == project.activity
        });
        if unchanged {
            continue;
        }

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(project)?),
            OutputFormat::Text => print_text(project),
        }
        shown.insert(id.clone(), project.clone());
    }

    let removed: Vec<PathBuf> = shown
        .keys()
        .filter(|id| !snapshot.contains_key(*id))
        .cloned()
        .collect();
    for id in removed {
        shown.remove(&id);
        if format == OutputFormat::Text {
            println!("{} removed {}", timestamp(), id.display());
        }
    }
    Ok(())
}

fn print_text(project: &TrackedProject) {
    match &project.state.last_error {
        Some(error) if project.state.has_been_refreshed() => println!(
            "{} {} (stale: {})",
            timestamp(),
            status_row(&project.display_name, &project.state, &project.activity),
            error
        ),
        Some(error) => println!("{} {:<24} error: {}", timestamp(), project.display_name, error),
        None => println!(
            "{} {}",
            timestamp(),
            status_row(&project.display_name, &project.state, &project.activity)
        ),
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
