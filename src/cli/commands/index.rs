//! Index command implementation.

use anyhow::{Context, Result};
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli::output::{IndexStats, get_formatter};
use crate::cli::session::Session;
use crate::error::{AppError, IndexError};
use crate::models::{Config, Document, OutputFormat};
use crate::utils::extract_text;
use crate::utils::file::collect_documents;

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Add PDF or text files (or directories of them) to the index
    Add {
        /// Path to directory or file to index
        #[arg(required = true)]
        path: PathBuf,

        /// File patterns to exclude (can be specified multiple times)
        #[arg(long, short = 'e')]
        exclude: Vec<String>,

        /// Show what would be indexed without actually indexing
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove one document's chunks from the index
    Remove {
        /// Document id as shown by `index list`
        #[arg(required = true)]
        document_id: String,
    },

    /// Clear all indexed documents
    Clear {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        force: bool,
    },

    /// List indexed documents
    List,
}

pub async fn handle_index(cmd: IndexCommand, format: OutputFormat, verbose: bool) -> Result<()> {
    match cmd {
        IndexCommand::Add {
            path,
            exclude,
            dry_run,
        } => handle_add(path, exclude, dry_run, format, verbose).await,
        IndexCommand::Remove { document_id } => handle_remove(&document_id, format).await,
        IndexCommand::Clear { force } => handle_clear(force, format, verbose).await,
        IndexCommand::List => handle_list(format).await,
    }
}

async fn handle_add(
    path: PathBuf,
    exclude: Vec<String>,
    dry_run: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let path = path.canonicalize().context("invalid path")?;
    let files = collect_documents(&path, &exclude).context("failed to scan path")?;

    if files.is_empty() {
        println!("{}", formatter.format_message("No documents found to index."));
        return Ok(());
    }

    if verbose {
        eprintln!("Found {} files to process", files.len());
    }

    if dry_run {
        println!(
            "{}",
            formatter.format_message(&format!("Dry run: Would index {} files", files.len()))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let session = Session::open(&config).await?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut stats = IndexStats {
        files_scanned: files.len() as u64,
        ..Default::default()
    };

    for file_path in &files {
        pb.inc(1);

        let text = match extract_text(file_path, config.indexing.max_file_size) {
            Ok(t) => t,
            Err(e) => {
                if verbose {
                    pb.println(format!("Skipping {}: {}", file_path.display(), e));
                }
                stats.files_skipped += 1;
                continue;
            }
        };

        if text.trim().is_empty() {
            if verbose {
                pb.println(format!("Skipping {}: no text", file_path.display()));
            }
            stats.files_skipped += 1;
            continue;
        }

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.display().to_string());

        match session.index(Document::new(name, text)).await {
            Ok(report) => {
                if verbose {
                    pb.println(format!(
                        "Indexed {} ({} chunks)",
                        file_path.display(),
                        report.chunks
                    ));
                }
                stats.record(report);
            }
            Err(AppError::Index(IndexError::EmptyDocument)) => {
                if verbose {
                    pb.println(format!("Skipping {}: no text", file_path.display()));
                }
                stats.files_skipped += 1;
            }
            Err(e) => {
                pb.finish_and_clear();
                session.close().await;
                return Err(e).with_context(|| format!("failed to index {}", file_path.display()));
            }
        }
    }

    pb.finish_and_clear();
    session.close().await;

    stats.duration_ms = start_time.elapsed().as_millis() as u64;
    print!("{}", formatter.format_index_stats(&stats));

    Ok(())
}

async fn handle_remove(document_id: &str, format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let session = Session::open(&config).await?;

    let removed = session.remove_document(document_id).await;
    session.close().await;

    let message = match removed? {
        0 => format!("No document with id {}", document_id),
        n => format!("Removed {} chunk(s) of document {}", n, document_id),
    };
    println!("{}", formatter.format_message(&message));

    Ok(())
}

async fn handle_clear(force: bool, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Clearing all indexed documents...");
    }

    if !force && !confirm("This will delete ALL indexed documents. Continue? [y/N]")? {
        println!("{}", formatter.format_message("Cancelled."));
        return Ok(());
    }

    let session = Session::open(&config).await?;
    let cleared = session.clear().await;
    session.close().await;
    cleared?;

    println!(
        "{}",
        formatter.format_message("All indexed documents have been cleared.")
    );

    Ok(())
}

async fn handle_list(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let session = Session::open(&config).await?;

    let documents = session.documents().await;
    session.close().await;

    print!("{}", formatter.format_documents(&documents?));
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    println!("{}", prompt);
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

