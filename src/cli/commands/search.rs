use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::cli::session::Session;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'k', help = "Number of chunks to return")]
    pub k: Option<usize>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let k = args.k.unwrap_or(config.retrieval.default_k as usize);
    if k == 0 {
        anyhow::bail!("k must be at least 1");
    }

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  k: {k}");
    }

    let session = Session::open(&config).await?;
    let results = session.search(query, k).await;
    session.close().await;
    let results = results.context("search failed")?;

    if verbose {
        eprintln!("Timing:");
        eprintln!("  Retrieval: {}ms", results.duration_ms);
        eprintln!("  Total: {}ms", start_time.elapsed().as_millis());
        eprintln!();
    }

    print!("{}", formatter.format_retrieval(&results));

    Ok(())
}
