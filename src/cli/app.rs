use anyhow::{Context, Result};
use basekeeper::{BackupConfig, BackupOrchestrator, RunReport, inspect};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "basekeeper")]
#[command(about = "Scheduled PostgreSQL base backups with retention pruning")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file (also read from BASEKEEPER_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one backup (the default)
    Run,
    /// Apply retention without taking a backup
    Prune,
    /// Show the archive's lifecycle state; exits 1 unless the last run succeeded
    Status,
    /// Run now and then every `schedule_hours` until interrupted
    Watch,
    /// Print the effective configuration
    Config,
}

pub async fn execute(cli: Cli) -> Result<ExitCode> {
    let config =
        BackupConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            run_once(&BackupOrchestrator::from_config(&config)).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Prune => {
            let orchestrator = BackupOrchestrator::from_config(&config);
            match orchestrator.prune_only()? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("retention is disabled"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let status = inspect(&config.archive_root).with_context(|| {
                format!("failed to inspect '{}'", config.archive_root.display())
            })?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(if status.last_run_succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Watch => {
            watch(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// A failed backup is recorded on disk and is not an error for the caller.
/// Only an unusable archive root is.
async fn run_once(orchestrator: &BackupOrchestrator) -> Result<RunReport> {
    let report = orchestrator.run().await.with_context(|| {
        format!(
            "backup aborted: archive root '{}' is unusable",
            orchestrator.root().display()
        )
    })?;

    if !report.succeeded() {
        error!(run = %report.run_id, verdict = %report.verdict, "backup failed");
    }
    for diagnostic in &report.diagnostics {
        error!(run = %report.run_id, "{}", diagnostic);
    }
    Ok(report)
}

async fn watch(config: &BackupConfig) -> Result<()> {
    let orchestrator = BackupOrchestrator::from_config(config);
    let interval = config.schedule_interval();
    info!(
        root = %config.archive_root.display(),
        every_hours = config.schedule_hours,
        "watch mode started"
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = run_once(&orchestrator) => {
                result?;
            }
            _ = &mut shutdown => {
                info!("shutdown requested during a run, stopping");
                return Ok(());
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => {
                info!("watch mode stopped");
                return Ok(());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
