use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use studysphere::cli::commands::{
    handle_ask, handle_config, handle_explain, handle_index, handle_quiz, handle_search,
    handle_serve, handle_status, handle_summarize,
};
use studysphere::cli::{Cli, Commands};
use studysphere::models::OutputFormat;

fn init_tracing(verbose: bool) {
    let default = if verbose { "studysphere=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format.unwrap_or_default();
    let verbose = cli.verbose;

    // The daemon installs its own signal handling and must clean up its socket.
    if let Commands::Serve(args) = cli.command {
        return handle_serve(args).await;
    }

    tokio::select! {
        result = run_command(cli.command, format, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Status => handle_status(format, verbose).await,
        Commands::Index(cmd) => handle_index(cmd, format, verbose).await,
        Commands::Search(args) => handle_search(args, format, verbose).await,
        Commands::Ask(args) => handle_ask(args, format, verbose).await,
        Commands::Explain(args) => handle_explain(args, format, verbose).await,
        Commands::Summarize(args) => handle_summarize(args, format, verbose).await,
        Commands::Quiz(args) => handle_quiz(args, format, verbose).await,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await,
        Commands::Serve(args) => handle_serve(args).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
