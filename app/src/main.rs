// In app/src/main.rs

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use data::HistoricDataHandler;
use engine::{Session, SignalReplay};
use rust_decimal::Decimal;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Turtle ATR position sizing over an event-driven backtest.")]
struct Cli {
    /// Directory holding `base.toml` and the per-environment overrides.
    #[arg(long, default_value = "config", global = true)]
    config_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replays a signal file against historical bars and reports the result.
    Backtest {
        /// Bar file: `symbol,timestamp,open,high,low,close,volume,atr`.
        #[arg(long)]
        bars: PathBuf,

        /// Signal file: `timestamp,symbol,signal_type,atr`.
        #[arg(long)]
        signals: PathBuf,

        /// Overrides `session.initial_capital`.
        #[arg(long)]
        capital: Option<Decimal>,
    },
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = app_config::load_settings_from(&cli.config_dir)
        .with_context(|| format!("failed to load settings from {}", cli.config_dir))?;

    // --- Tracing Setup ---
    let level = tracing::Level::from_str(&settings.app.log_level).unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new().with_default(level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::info!(environment = %settings.app.environment, "Starting turtle application");

    match cli.command {
        Commands::Backtest {
            bars,
            signals,
            capital,
        } => {
            if let Some(capital) = capital {
                settings.session.initial_capital = capital;
            }
            handle_backtest(&settings, bars, signals).await?;
        }
    }

    tracing::info!("Turtle application has finished successfully.");
    Ok(())
}

/// Handles the logic for the `backtest` subcommand.
async fn handle_backtest(
    settings: &app_config::Settings,
    bars: PathBuf,
    signals: PathBuf,
) -> Result<()> {
    // --- 1. Load Data ---
    let data = HistoricDataHandler::from_csv(
        &bars,
        &settings.session.lot_sizes(),
        settings.session.default_lot_size,
    )
    .with_context(|| format!("failed to load bars from {}", bars.display()))?;
    let strategy = SignalReplay::from_csv(&signals)?;

    // --- 2. Assemble and Run the Session ---
    let mut session = Session::from_settings(settings, Arc::new(data), Box::new(strategy))?;
    let summary = session.run().await?;

    // --- 3. Report ---
    println!("\n{summary}");
    Ok(())
}
