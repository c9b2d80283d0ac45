// ABOUTME: Discover command - lists projects found in editor and agent manifests

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::util::truncate;
use super::OutputFormat;
use crate::config::EngineConfig;
use crate::discovery::ProjectDiscovery;
use crate::git::{RepositoryProbe, RepositoryProber};
use crate::models::DiscoveredProject;
use crate::process::{GitTool, ProcessRunner};

#[derive(Serialize)]
struct DiscoverOutput<'a> {
    projects: &'a [DiscoveredProject],
    unreachable: &'a [PathBuf],
    errors: Vec<String>,
}

/// Execute the discover command
pub async fn execute(format: OutputFormat, config: &EngineConfig) -> Result<()> {
    let tool = GitTool::locate(&config.git_binary)
        .await
        .context("git is required to validate discovered projects")?;
    let prober: Arc<dyn RepositoryProber> = Arc::new(RepositoryProbe::new(
        Arc::new(ProcessRunner::for_git()),
        &tool,
        config.process_timeout,
    ));

    let result = ProjectDiscovery::new(prober).scan().await;
    let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();

    match format {
        OutputFormat::Json => {
            let output = DiscoverOutput {
                projects: &result.projects,
                unreachable: &result.unreachable,
                errors,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if result.projects.is_empty() {
                println!("No projects discovered.");
            } else {
                println!("{:<24} {:<12} PATH", "NAME", "SOURCE");
                println!("{}", "-".repeat(80));
                for project in &result.projects {
                    println!(
                        "{:<24} {:<12} {}",
                        truncate(&project.display_name, 24),
                        project.source.label(),
                        project.path.display()
                    );
                }
                println!();
                println!("Total: {} project(s)", result.projects.len());
            }
            for path in &result.unreachable {
                eprintln!("warning: {} is not reachable", path.display());
            }
            for error in errors {
                eprintln!("warning: {error}");
            }
        }
    }

    Ok(())
}
