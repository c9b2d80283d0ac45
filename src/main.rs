// ABOUTME: Main entry point for gitbar
//
// Binary: gitbar
// Usage: gitbar [--format text|json] [--config FILE] [COMMAND]
// - No command: same as watch
// - watch: track repositories and print status changes
// - status: probe repositories once
// - discover: list projects found in editor and agent manifests
// - check: verify git and show configuration

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

use gitbar::cli;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();
    let config = cli::load_config(args.config.as_ref())?;

    match args.command {
        Some(cli::Commands::Status(status_args)) => {
            cli::status::execute(status_args, args.format, &config).await
        }
        Some(cli::Commands::Discover) => cli::discover::execute(args.format, &config).await,
        Some(cli::Commands::Check) => cli::check::execute(args.format, &config).await,
        Some(cli::Commands::Watch(watch_args)) => {
            cli::watch::execute(watch_args, args.format, config).await
        }
        None => cli::watch::execute(cli::WatchArgs::default(), args.format, config).await,
    }
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    let log_dir = dirs::home_dir()
        .map(|home| home.join(".gitbar").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".gitbar/logs"));

    let _ = std::fs::create_dir_all(&log_dir);

    // One JSONL file per run
    let log_file = log_dir.join(format!(
        "gitbar-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "gitbar=info".into())
    };

    match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter())
            .init(),
        Err(e) => {
            eprintln!("warning: cannot write {}: {e}; logging to stderr", log_file.display());
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .with(filter())
                .init();
        }
    }
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Please check the logs in ~/.gitbar/logs for more details.");
    }));
}
