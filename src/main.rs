mod browser;
mod cli;
mod commands;
mod config;
mod errors;
mod identifier;
mod model;
mod pipeline;
mod store;
mod util;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let log_guard = init_tracing(log_file_for(&cli).as_deref());

    let result = run(cli);
    if let Err(err) = &result {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
    }

    // exit() skips destructors; flush the file writer first.
    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload(args) => commands::upload::run(args),
        Commands::MapUuids(args) => commands::map_uuids::run(args),
        Commands::Report(args) => commands::report::run(args),
        Commands::Merge(args) => commands::merge::run(args),
        Commands::Reconcile(args) => commands::reconcile::run(args),
    }
}

/// Upload runs always keep a durable log; other commands only on request.
fn log_file_for(cli: &Cli) -> Option<PathBuf> {
    cli.log_file.clone().or_else(|| match &cli.command {
        Commands::Upload(args) => Some(args.docs_dir.join("upload_log.txt")),
        _ => None,
    })
}

/// Stderr logging, plus an appending file layer when `log_file` is set.
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();
        return None;
    };

    let opened = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(path));

    match opened {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(err) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            warn!(path = %path.display(), error = %err, "cannot open log file; logging to stderr only");
            None
        }
    }
}
