//! face-analysis CLI
//!
//! Submits a photo to the analysis backend and follows the staged results
//! over MQTT until the session completes or fails.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use face_analysis::commands::{self, AnalyzeOptions};
use face_analysis::output::print_error;
use fa_core::config::{self, ClientConfig};

#[derive(Parser)]
#[command(name = "face-analysis")]
#[command(author, version, about = "Staged face analysis client")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a photo and follow the analysis to the end
    Analyze {
        /// Photo to analyze (JPEG or PNG)
        image: PathBuf,
        /// Event id (overrides config)
        #[arg(short, long)]
        event: Option<String>,
        /// Result language (overrides config)
        #[arg(short, long)]
        language: Option<String>,
        /// Backend base URL (overrides config)
        #[arg(long, env = "FACE_ANALYSIS_API")]
        api: Option<String>,
        /// MQTT broker host (overrides config)
        #[arg(long)]
        broker: Option<String>,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// Do not check the event before submitting
        #[arg(long)]
        skip_event_check: bool,
    },

    /// Check whether an event accepts submissions
    CheckEvent {
        /// Event id (defaults to the configured one)
        event: Option<String>,
        /// Backend base URL (overrides config)
        #[arg(long, env = "FACE_ANALYSIS_API")]
        api: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_deref();

    let ok = match cli.command {
        Commands::Analyze {
            image,
            event,
            language,
            api,
            broker,
            json,
            skip_event_check,
        } => {
            let mut config = load(config_path)?;
            if let Some(event) = event {
                config.event_id = event;
            }
            if let Some(language) = language {
                config.language = language;
            }
            if let Some(api) = api {
                config.api_endpoint = api;
            }
            if let Some(host) = broker {
                config.broker.host = host;
            }
            config.validate()?;

            let options = AnalyzeOptions {
                image,
                json,
                skip_event_check,
            };
            commands::analyze_command(&config, options).await?
        }
        Commands::CheckEvent { event, api } => {
            let mut config = load(config_path)?;
            if let Some(api) = api {
                config.api_endpoint = api;
            }
            commands::check_event_command(&config, event.as_deref()).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                commands::config_show(config_path)?;
                true
            }
            ConfigAction::Get { key } => commands::config_get(config_path, &key)?,
            ConfigAction::Set { key, value } => {
                commands::config_set(config_path, &key, &value)?;
                true
            }
            ConfigAction::Init { force } => {
                commands::config_init(config_path, force)?;
                true
            }
            ConfigAction::Path => {
                commands::config_path(config_path);
                true
            }
        },
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn load(path: Option<&std::path::Path>) -> Result<ClientConfig> {
    match config::load_client_config(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            print_error(&format!("Failed to load configuration: {}", e));
            Err(e.into())
        }
    }
}
