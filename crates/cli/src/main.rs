//! ADA CLI, the main entry point.
//!
//! Commands:
//! - (none)     Interactive chat
//! - `personas` List the built-in personas
//! - `backends` List the configured backends

use std::path::PathBuf;
use std::time::Duration;

use ada_config::AppConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, reload};

mod commands;

/// Blocking stdin reads are abandoned after this long on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "ada", about = "ADA, a conversational agent", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ~/.ada/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Persona to start with
    #[arg(short, long, global = true, env = "ADA_PERSONA")]
    persona: Option<String>,

    /// Backend to use, by its name in the config
    #[arg(short, long, global = true, env = "ADA_BACKEND")]
    backend: Option<String>,

    /// Save the conversation under the history directory
    #[arg(long, global = true)]
    history: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in personas
    Personas,

    /// List the configured backends
    Backends,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging starts before the config is read so its messages are kept.
    let (initial, pinned) = startup_filter(cli.verbose, EnvFilter::try_from_default_env().ok());
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;
    if !pinned {
        filter_handle
            .reload(EnvFilter::new(&config.log_level))
            .context("Failed to apply the configured log level")?;
    }
    debug!(
        persona = %config.persona,
        backend = %config.backend,
        history = config.history,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Personas) => commands::personas::run(&config),
        Some(Commands::Backends) => commands::backends::run(&config),
        None => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start the async runtime")?;
            let result = runtime.block_on(commands::chat::run(config));
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result
        }
    }
}

/// The filter used until the config is loaded, and whether it stays.
///
/// `--verbose` wins over RUST_LOG; either one pins the filter. Otherwise
/// logging starts at `info` and moves to the configured level.
fn startup_filter(verbose: bool, from_env: Option<EnvFilter>) -> (EnvFilter, bool) {
    match (verbose, from_env) {
        (true, _) => (EnvFilter::new("debug"), true),
        (false, Some(filter)) => (filter, true),
        (false, None) => (EnvFilter::new("info"), false),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    config.apply_env_overrides();

    if let Some(persona) = &cli.persona {
        config.persona = persona.clone();
    }
    if let Some(backend) = &cli.backend {
        config.backend = backend.clone();
    }
    if cli.history {
        config.history = true;
    }

    config.validate()?;
    Ok(config)
}
