use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file with defaults")]
    Init {
        #[arg(long, short = 'F', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration and data paths")]
    Path,
    #[command(about = "Set a configuration value, e.g. `generation.model llama3.2`")]
    Set {
        #[arg(required = true, help = "Dotted key, e.g. indexing.chunk_size")]
        key: String,
        #[arg(required = true, help = "New value")]
        value: String,
    },
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(),
        ConfigCommand::Set { key, value } => handle_set(&key, &value, formatter.as_ref()),
    }
}

fn handle_init(force: bool, formatter: &dyn Formatter) -> Result<()> {
    let config_path =
        Config::config_path().ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    let path = Config::default()
        .save()
        .context("failed to create config")?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = Config::load()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Config file: {}", path.display());
        println!();
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path() -> Result<()> {
    println!("Configuration paths:");
    println!();

    if let Some(path) = Config::config_path() {
        let state = if path.exists() { "active" } else { "would be" };
        println!("Config file ({}): {}", state, path.display());
    }

    let config = Config::load().unwrap_or_default();
    if let Some(dir) = config.index_dir() {
        println!("Index directory: {}", dir.display());
    }
    if let Some(path) = Config::metrics_db_path() {
        println!("Metrics database: {}", path.display());
    }
    println!("Daemon socket: {}", config.socket_path().display());

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        if env_path.exists() {
            println!(".env file (active): {}", env_path.display());
        }
    }

    Ok(())
}

fn handle_set(key: &str, value: &str, formatter: &dyn Formatter) -> Result<()> {
    let mut config = match Config::config_path() {
        Some(path) if path.exists() => Config::load_from(&path)?,
        _ => Config::default(),
    };

    config.set_value(key, value)?;
    let path = config.save().context("failed to save config")?;

    println!(
        "{}",
        formatter.format_message(&format!("Set {} = {} in {}", key, value, path.display()))
    );
    Ok(())
}
