//! Patch Updater - Main entry point
//!
//! Runs one update cycle for the configured client installation from a terminal.

use anyhow::Result;
use clap::Parser;
use patch_updater::transfer::progress::{format_bytes, format_speed};
use patch_updater::utils::{self, shutdown::ShutdownCoordinator};
use patch_updater::{
    Config, EventBus, FileSettings, SettingKey, SettingsStore, UpdateEvent, UpdateState, Updater,
    UpdaterContext,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Client installation directory (validated and saved to settings)
    #[arg(short = 'd', long, value_name = "DIR")]
    client_dir: Option<PathBuf>,

    /// Patch environment (saved to settings)
    #[arg(short, long)]
    environment: Option<String>,

    /// Access key for non-public environments (saved to settings)
    #[arg(short, long)]
    key: Option<String>,

    /// Download an available update without asking
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    // Initialize logging
    utils::logger::init(&config.log)?;

    tracing::info!("Starting patch-updater v{}", env!("CARGO_PKG_VERSION"));

    let settings = Arc::new(FileSettings::open(&config.settings.path)?);
    tracing::info!("Using settings file {}", settings.path().display());
    if let Some(environment) = args.environment {
        settings.set(SettingKey::Environment, &environment)?;
    }
    if let Some(key) = args.key {
        settings.set(SettingKey::Key, &key)?;
    }

    let events = EventBus::new();
    let printer = tokio::spawn(print_events(events.subscribe()));

    let updater = Updater::new(UpdaterContext {
        config,
        settings,
        events,
    })?;

    // First Ctrl+C / SIGTERM cancels the cycle (which then re-verifies), the
    // second one exits.
    let shutdown_coordinator = ShutdownCoordinator::new();
    let mut shutdown_rx = shutdown_coordinator.subscribe();
    let interrupted = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        loop {
            if let Err(e) = shutdown_coordinator.wait_for_signal().await {
                tracing::warn!("Signal handling unavailable: {}", e);
                break;
            }
        }
    });
    let cancel = updater.cancel_handle();
    let interrupted_flag = interrupted.clone();
    tokio::spawn(async move {
        loop {
            match shutdown_rx.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
            if interrupted_flag.swap(true, Ordering::SeqCst) {
                tracing::warn!("Second interrupt, exiting without waiting for the cycle");
                std::process::exit(130);
            }
            cancel.cancel();
        }
    });

    let mut state = match args.client_dir {
        Some(dir) => updater.choose_directory(&dir).await?,
        None => updater.start().await?,
    };
    if interrupted.load(Ordering::SeqCst) {
        tracing::info!("Interrupted, stopping in state {}", state);
    }

    if state == UpdateState::UpdateAvailable {
        let files = updater.pending().unwrap_or_default();
        if args.yes && !interrupted.load(Ordering::SeqCst) {
            state = updater.accept_update().await?;
        } else {
            tracing::info!(
                "Update available: {} files ({}). Run again with --yes to download.",
                files.len(),
                format_bytes(files.total_bytes())
            );
        }
    }

    drop(updater);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), printer).await;

    tracing::info!("Finished in state {}", state);
    Ok(exit_code(state))
}

async fn print_events(mut rx: broadcast::Receiver<UpdateEvent>) {
    loop {
        match rx.recv().await {
            Ok(UpdateEvent::StateChanged { state }) => tracing::debug!("State: {}", state),
            Ok(UpdateEvent::InvalidDirectoryChosen { message }) => {
                tracing::error!("{}", message)
            }
            Ok(UpdateEvent::DownloadStarted {
                filename,
                index,
                total,
                ..
            }) => tracing::info!("[{}/{}] {}", index + 1, total, filename),
            Ok(UpdateEvent::DownloadProgress(progress)) => tracing::debug!(
                "{}: {} / {} ({:.1}%, {})",
                progress.name,
                format_bytes(progress.downloaded),
                format_bytes(progress.total),
                progress.percent,
                format_speed(progress.speed)
            ),
            Ok(UpdateEvent::DownloadFailed { filename, error }) => {
                tracing::error!("{} failed: {}", filename, error)
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Event printer skipped {} events", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn exit_code(state: UpdateState) -> ExitCode {
    match state {
        UpdateState::Done => ExitCode::SUCCESS,
        UpdateState::UpdateAvailable => ExitCode::from(2),
        UpdateState::Setup => ExitCode::from(3),
        UpdateState::RequiresElevation => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}
