//! Autosend - triggered-transaction tool for a bitcoind node
//!
//! # WARNING
//! - This tool moves real funds. Double-check destinations and proportions.
//! - Run it from cron; each invocation re-evaluates triggers from scratch.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::error;

use autosend::cli::commands;
use autosend::ConfigStore;

/// Triggered-transaction tool: split bitcoind balances on a threshold
#[derive(Parser)]
#[command(name = "autosend")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "AUTOSEND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a split rule for an address
    Create {
        /// Wallet address to watch
        address: String,

        /// Destinations as ADDRESS:PROPORTION (proportions must sum to 1)
        #[arg(required = true)]
        destinations: Vec<String>,

        /// Fixed fee withheld from the distributed amount
        #[arg(long)]
        fee: Decimal,

        /// Balance threshold that triggers execution
        #[arg(long)]
        minimum: Decimal,
    },

    /// Evaluate and execute rules (all of them, or only the given addresses)
    Execute {
        /// Addresses to process; empty means every configured rule
        addresses: Vec<String>,
    },

    /// List configured rules
    List,

    /// Delete the rule for an address
    Delete {
        /// Watched address whose rule to remove
        address: String,
    },

    /// Print a connection parameter (e.g. bitcoind.host)
    Get {
        parameter: String,
    },

    /// Set a connection parameter
    Set {
        parameter: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("autosend=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(ConfigStore::default_path);
    let mut store = match ConfigStore::load(config_path).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Create {
            address,
            destinations,
            fee,
            minimum,
        } => commands::create(&mut store, &address, &destinations, fee, minimum).await,
        Commands::Execute { addresses } => commands::execute(&store, &addresses).await,
        Commands::List => commands::list(&store),
        Commands::Delete { address } => commands::delete(&mut store, &address).await,
        Commands::Get { parameter } => commands::get_param(&store, &parameter),
        Commands::Set { parameter, value } => {
            commands::set_param(&mut store, &parameter, &value).await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
