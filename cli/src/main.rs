// fleetlink — store-and-forward sensor telemetry relay
//
// Two roles, one binary: `gateway` polls the BLE fleet and relays batches,
// `server` ingests them and drives storage and alerting.

mod ble;
mod config;
mod gateway;
mod server;
mod sim;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use config::Config;
use fleetlink_core::fleet::Radio;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fleetlink")]
#[command(about = "Fleetlink — store-and-forward sensor telemetry relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Poll the sensor fleet and relay batches to the ingestion endpoint
    Gateway {
        /// Radio backend to drive the fleet with
        #[arg(long, value_enum, default_value_t = RadioBackend::Ble)]
        radio: RadioBackend,
    },
    /// Accept batches, dispatch them to storage, and send alert digests
    Server,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RadioBackend {
    /// The machine's BLE adapter
    Ble,
    /// A deterministic simulated fleet (no hardware required)
    Sim,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init(cli.config),
        Commands::Gateway { radio } => {
            let config = Config::load(cli.config.as_deref())?;
            let radio: Box<dyn Radio> = match radio {
                RadioBackend::Ble => Box::new(
                    ble::BtleRadio::new()
                        .await
                        .context("initializing the BLE adapter")?,
                ),
                RadioBackend::Sim => Box::new(sim::SimRadio::new(config.fleet.clone())),
            };
            gateway::run(config, radio).await
        }
        Commands::Server => {
            let config = Config::load(cli.config.as_deref())?;
            server::run(config).await
        }
    }
}

fn cmd_init(path: Option<PathBuf>) -> Result<()> {
    let config_file = match path {
        Some(path) => path,
        None => Config::default_config_file()?,
    };

    if config_file.exists() {
        println!(
            "  {} Config already exists: {}",
            "!".yellow(),
            config_file.display()
        );
        return Ok(());
    }

    Config::default().save(&config_file)?;
    println!("  {} Wrote {}", "✓".green(), config_file.display());
    println!();
    println!("Edit the fleet roster and TLS paths, then run:");
    println!("  fleetlink server");
    println!("  fleetlink gateway --radio ble");
    Ok(())
}
