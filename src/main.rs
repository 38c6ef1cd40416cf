//! # tessera
//!
//! Command-line driver for the compositor core. There is no transport here;
//! the binary validates configuration and replays scripted sessions through a
//! headless core.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use tessera::replay::{self, Script};
use tessera::TesseraConfig;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT"),
    ", built ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Input and surface-lifecycle core of a Wayland compositor")]
#[command(version = LONG_VERSION)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/tessera/tessera.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Play a scripted session through a headless core and print the outbox as JSON
    Replay {
        /// TOML script, or JSON if the file ends in .json
        script: PathBuf,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🚀 Starting tessera {}", LONG_VERSION);

    let config = match TesseraConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            TesseraConfig::default()
        }
    };

    match cli.command {
        Some(Command::Replay { script, pretty }) => {
            let script = Script::load(&script)?;
            let output = replay::run(&script, config)?;
            let json = if pretty {
                serde_json::to_string_pretty(&output)
            } else {
                serde_json::to_string(&output)
            }
            .context("Failed to serialize replay output")?;
            println!("{}", json);
        }
        Some(Command::Config) | None => {
            config.validate()?;
            let toml = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            print!("{}", toml);
        }
    }

    Ok(())
}
