use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{debug, info};

use crate::client::{DaemonClient, stop_daemon};
use crate::error::DaemonError;
use crate::models::Config;
use crate::server::run_daemon;

const STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(subcommand)]
    pub command: Option<ServeCommand>,

    #[arg(long, hide = true)]
    pub daemon: bool,

    /// Run the assistant attached to this terminal instead of detaching
    #[arg(long)]
    pub foreground: bool,
}

#[derive(Debug, Subcommand)]
pub enum ServeCommand {
    /// Drain queued requests and stop the background assistant
    Stop,
    /// Stop the background assistant, then start a fresh one
    Restart,
}

pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    let config = Config::load()?;

    if args.daemon || args.foreground {
        if args.foreground {
            eprintln!("Serving on {} (Ctrl-C to stop)", config.socket_path().display());
        }
        run_daemon(config).await?;
        return Ok(());
    }

    let client = DaemonClient::new(&config);
    match args.command {
        None => start(&client, &config).await,
        Some(ServeCommand::Stop) => {
            if stop(&client, &config).await? {
                println!("Assistant stopped");
            } else {
                println!("Assistant is not running");
            }
            Ok(())
        }
        Some(ServeCommand::Restart) => {
            stop(&client, &config).await?;
            start(&client, &config).await
        }
    }
}

async fn start(client: &DaemonClient, config: &Config) -> Result<()> {
    if client.is_running() {
        println!("Assistant is already running");
        return Ok(());
    }

    client
        .start()
        .await
        .context("background assistant did not become ready")?;

    let pid = client.status().await.map(|s| s.pid).ok();
    info!(?pid, "daemon started");
    match pid {
        Some(pid) => println!("Assistant started (pid {pid})"),
        None => println!("Assistant started"),
    }
    println!("Socket: {}", config.socket_path().display());
    Ok(())
}

/// Returns whether a running daemon was stopped.
///
/// Asks over the socket first so queued requests drain, then falls back to SIGTERM.
async fn stop(client: &DaemonClient, config: &Config) -> Result<bool> {
    if client.is_running() {
        match client.shutdown().await {
            Ok(()) => {
                if client.wait_until_stopped(STOP_GRACE).await.is_ok() {
                    return Ok(true);
                }
                debug!("daemon still up after shutdown request");
            }
            Err(e) => debug!("shutdown request failed: {e}"),
        }
    }

    match stop_daemon(config) {
        Ok(()) => {
            client.wait_until_stopped(STOP_GRACE).await?;
            Ok(true)
        }
        Err(DaemonError::NotRunning) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
