//! Command-line interface for the study assistant.

pub mod commands;
pub mod output;
pub mod session;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Study assistant: explain, summarize, quiz, and answer questions from your notes.
#[derive(Debug, Parser)]
#[command(name = "studysphere")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check daemon, Ollama, and index status
    Status,

    /// Manage the notes index (add, remove, clear, list)
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Retrieve the note chunks most similar to a query
    Search(commands::SearchArgs),

    /// Answer a question grounded in your indexed notes
    Ask(commands::AskArgs),

    /// Explain a concept, optionally with extra context
    Explain(commands::ExplainArgs),

    /// Summarize notes into key points
    Summarize(commands::SummarizeArgs),

    /// Generate multiple-choice questions from content
    Quiz(commands::QuizArgs),

    /// Run or control the background daemon
    Serve(commands::ServeArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
