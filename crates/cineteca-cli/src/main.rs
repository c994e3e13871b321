//! Cineteca CLI - headless front end for the playback controller
//!
//! Features:
//! - Source probing (reachability, manifest ladder, starting rendition)
//! - Headless catalogue playback against a simulated media element
//! - Saved progress inspection
//! - Playback settings

use anyhow::Context;
use cineteca_core::{JsonFileStore, PlayerConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;
mod headless;
mod output;

use output::OutputFormat;

/// Cineteca CLI - adaptive playback toolkit
#[derive(Parser)]
#[command(name = "cineteca")]
#[command(version)]
#[command(about = "Probe sources, play catalogues headlessly, manage progress", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Progress and settings file
    #[arg(long, env = "CINETECA_STORE", default_value = "cineteca-store.json", global = true)]
    store: PathBuf,

    /// Player configuration file (JSON)
    #[arg(short, long, env = "CINETECA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe a source and show how it would be played
    Probe {
        /// Media or manifest URL
        url: String,

        /// Treat the sink as progressive-only
        #[arg(long)]
        no_adaptive: bool,
    },

    /// Play a catalogue against a simulated media element
    Play {
        /// Catalogue file (JSON array of entries)
        catalogue: PathBuf,

        /// Entry to start from (defaults to the first)
        #[arg(long)]
        id: Option<String>,

        /// Simulated running time of each title in seconds
        #[arg(short, long, default_value = "10")]
        duration: f64,

        /// Keep playing the following entries
        #[arg(long)]
        continuous: bool,
    },

    /// Inspect or clear saved progress
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },

    /// Show or change playback settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum ProgressAction {
    /// List every saved position
    List,
    /// Show the saved position of one title
    Get { id: String },
    /// Forget the saved position of one title
    Clear { id: String },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Update one or more settings
    Set {
        /// Volume between 0 and 1
        #[arg(long)]
        volume: Option<f64>,

        /// Playback rate (0.5, 0.75, 1, 1.25, 1.5 or 2)
        #[arg(long)]
        rate: Option<f64>,

        /// Start playing as soon as a title is ready
        #[arg(long)]
        autoplay: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    cineteca_core::init();

    let config = match &cli.config {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    match cli.command {
        Commands::Probe { url, no_adaptive } => {
            commands::probe(&config, &url, !no_adaptive, cli.format).await?;
        }

        Commands::Play {
            catalogue,
            id,
            duration,
            continuous,
        } => {
            if duration.is_nan() || duration <= 0.0 {
                anyhow::bail!("duration must be positive");
            }
            commands::play(
                config,
                commands::PlayOptions {
                    catalogue: &catalogue,
                    id: id.as_deref(),
                    duration,
                    continuous,
                    store: &cli.store,
                    format: cli.format,
                },
            )
            .await?;
        }

        Commands::Progress { action } => {
            let store = open_store(&cli.store)?;
            match action {
                ProgressAction::List => commands::progress_list(&store, cli.format)?,
                ProgressAction::Get { id } => commands::progress_get(&store, &id, cli.format)?,
                ProgressAction::Clear { id } => commands::progress_clear(&store, &id)?,
            }
        }

        Commands::Settings { action } => {
            let store = open_store(&cli.store)?;
            match action {
                SettingsAction::Show => commands::settings_show(&store, cli.format)?,
                SettingsAction::Set {
                    volume,
                    rate,
                    autoplay,
                } => commands::settings_set(&store, volume, rate, autoplay, cli.format)?,
            }
        }
    }

    Ok(())
}

fn open_store(path: &Path) -> anyhow::Result<JsonFileStore> {
    JsonFileStore::open(path).with_context(|| format!("failed to open store {}", path.display()))
}
