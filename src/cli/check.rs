// ABOUTME: Check command - verifies git and shows the effective configuration

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use super::OutputFormat;
use crate::config::EngineConfig;
use crate::discovery::DiscoveryRoot;
use crate::models::ProjectSource;
use crate::process::GitTool;

#[derive(Serialize)]
struct CheckReport<'a> {
    git_binary: Option<PathBuf>,
    git_version: Option<String>,
    git_error: Option<String>,
    config: &'a EngineConfig,
    discovery_roots: Vec<RootReport>,
}

#[derive(Serialize)]
struct RootReport {
    source: ProjectSource,
    path: Option<PathBuf>,
    present: bool,
}

/// Execute the check command
pub async fn execute(format: OutputFormat, config: &EngineConfig) -> Result<()> {
    let located = GitTool::locate(&config.git_binary).await;
    let home = dirs::home_dir();
    let roots: Vec<RootReport> = DiscoveryRoot::defaults()
        .iter()
        .map(|root| {
            let path = root.resolve(home.as_deref());
            RootReport {
                source: root.source,
                present: path.as_ref().is_some_and(|p| p.is_dir()),
                path,
            }
        })
        .collect();

    let report = CheckReport {
        git_binary: located.as_ref().ok().map(|t| t.binary().to_path_buf()),
        git_version: located.as_ref().ok().map(|t| t.version().to_string()),
        git_error: located.as_ref().err().map(ToString::to_string),
        config,
        discovery_roots: roots,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => output_text(&report),
    }

    located?;
    Ok(())
}

fn output_text(report: &CheckReport<'_>) {
    match (&report.git_binary, &report.git_version, &report.git_error) {
        (Some(binary), Some(version), _) => println!("git:        {version} ({})", binary.display()),
        (_, _, Some(error)) => println!("git:        unavailable - {error}"),
        _ => {}
    }

    let config = report.config;
    println!("timeout:    {}s", config.process_timeout.as_secs());
    println!("probes:     {} concurrent", config.max_concurrent_probes);
    println!("poll:       every {}s", config.poll_interval.as_secs());
    println!(
        "discovery:  {}",
        if config.discovery_enabled {
            format!("every {}s", config.discovery_interval.as_secs())
        } else {
            "disabled".to_string()
        }
    );
    println!("projects:   {}", config.projects.len());
    for project in &config.projects {
        println!("  - {}", project.display());
    }

    println!("roots:");
    for root in &report.discovery_roots {
        let path = root
            .path
            .as_ref()
            .map_or_else(|| "(no home directory)".to_string(), |p| p.display().to_string());
        let marker = if root.present { "ok" } else { "missing" };
        println!("  {:<12} {:<8} {}", root.source.label(), marker, path);
    }
}
