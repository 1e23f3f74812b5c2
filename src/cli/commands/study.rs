//! Generation commands: ask, explain, summarize, quiz.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::cli::output::{Formatter, get_formatter};
use crate::cli::session::Session;
use crate::error::AppError;
use crate::models::{Config, Difficulty, OutputFormat, RequestParams};
use crate::utils::extract_text;

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from your notes")]
    pub question: String,

    #[arg(long, short = 'k', help = "Number of note chunks to use as context")]
    pub k: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExplainArgs {
    #[arg(required = true, help = "Concept or question to explain")]
    pub question: String,

    #[arg(
        long,
        short = 'c',
        conflicts_with = "context_file",
        help = "Extra context text"
    )]
    pub context: Option<String>,

    #[arg(long, help = "Read extra context from a PDF or text file")]
    pub context_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    #[arg(
        long,
        short = 'i',
        conflicts_with = "text",
        required_unless_present = "text",
        help = "PDF or text file to summarize"
    )]
    pub file: Option<PathBuf>,

    #[arg(long, short = 't', help = "Notes text to summarize")]
    pub text: Option<String>,
}

#[derive(Debug, Args)]
pub struct QuizArgs {
    #[arg(
        long,
        short = 'i',
        conflicts_with = "content",
        required_unless_present = "content",
        help = "PDF or text file to quiz on"
    )]
    pub file: Option<PathBuf>,

    #[arg(long, short = 'c', help = "Content text to quiz on")]
    pub content: Option<String>,

    #[arg(long, short = 'n', default_value_t = 5, help = "Number of questions")]
    pub count: u32,

    #[arg(
        long,
        short = 'd',
        default_value = "medium",
        help = "Difficulty: easy, medium, or hard"
    )]
    pub difficulty: Difficulty,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    if verbose {
        eprintln!("Question: \"{}\"", args.question);
    }

    let session = Session::open(&config).await?;
    if verbose {
        let via = if session.is_daemon() { "daemon" } else { "in-process" };
        eprintln!("Running {via}");
    }
    let answer = session.ask(&args.question, args.k).await;
    session.close().await;

    match answer {
        Ok(answer) => {
            if verbose {
                eprintln!("Used {} note chunk(s) as context", answer.sources.len());
            }
            print!("{}", formatter.format_answer(&answer));
            Ok(())
        }
        Err(e) => print_failure(formatter.as_ref(), e),
    }
}

pub async fn handle_explain(args: ExplainArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let context = match (args.context, args.context_file) {
        (Some(text), _) => Some(text),
        (None, Some(path)) => Some(read_input(&path, &config)?),
        (None, None) => None,
    };

    let params = RequestParams::Explain {
        question: args.question,
        context,
    };
    submit(&config, params, format).await
}

pub async fn handle_summarize(
    args: SummarizeArgs,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let config = Config::load()?;
    let notes = input_text(args.file.as_deref(), args.text, &config)?;
    submit(&config, RequestParams::summarize(notes), format).await
}

pub async fn handle_quiz(args: QuizArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    if args.count == 0 {
        anyhow::bail!("question count must be at least 1");
    }

    let config = Config::load()?;
    let content = input_text(args.file.as_deref(), args.content, &config)?;
    submit(
        &config,
        RequestParams::quiz(content, args.count, args.difficulty),
        format,
    )
    .await
}

async fn submit(config: &Config, params: RequestParams, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let session = Session::open(config).await?;
    let response = session.submit(params).await;
    session.close().await;

    match response {
        Ok(response) => {
            print!("{}", formatter.format_response(&response));
            Ok(())
        }
        Err(e) => print_failure(formatter.as_ref(), e),
    }
}

/// Agent failures are shown in place of the reply; anything else is a command error.
fn print_failure(formatter: &dyn Formatter, error: AppError) -> Result<()> {
    match error {
        AppError::Agent(e) => {
            print!("{}", formatter.format_agent_error(&e));
            Ok(())
        }
        other => Err(other.into()),
    }
}

fn input_text(file: Option<&Path>, text: Option<String>, config: &Config) -> Result<String> {
    match (file, text) {
        (Some(path), _) => read_input(path, config),
        (None, Some(text)) => Ok(text),
        (None, None) => anyhow::bail!("provide either a file or text"),
    }
}

fn read_input(path: &Path, config: &Config) -> Result<String> {
    extract_text(path, config.indexing.max_file_size)
        .with_context(|| format!("failed to read {}", path.display()))
}
