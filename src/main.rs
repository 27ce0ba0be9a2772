mod backend;
mod check;
mod client;
mod config;
mod history;
mod models;
mod samples;
mod scheduler;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "probe_agent=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(detected) => {
            if detected {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "fatal startup error");
            ExitCode::from(1)
        }
    }
}

/// Spawns one check loop per configured check type and blocks until an OS
/// shutdown signal arrives. Returns whether any cycle reported a detection.
async fn run(cli: Cli) -> Result<bool> {
    let plan = config::build_plan(cli.command).await?;
    let detected = Arc::new(AtomicBool::new(false));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    for cfg in plan.configs {
        handles.push(tokio::spawn(scheduler::run_check_loop(
            cfg,
            plan.backend.clone(),
            shutdown_rx.clone(),
            detected.clone(),
        )));
    }
    drop(shutdown_rx);

    wait_for_shutdown().await;
    tracing::info!("received shutdown signal, stopping check loops");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("shutdown complete");

    Ok(detected.load(Ordering::Relaxed))
}

/// Blocks until SIGINT or, on unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
