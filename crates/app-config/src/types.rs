// In crates/app-config/src/types.rs

use std::collections::BTreeMap;

use execution::ExecutionKind;
use risk::TurtleRiskSettings;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Capital and instrument settings for a trading session.
    #[serde(default)]
    pub session: SessionSettings,
    /// Unit sizing parameters.
    #[serde(default)]
    pub risk: TurtleRiskSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SessionSettings {
    /// Starting cash of the portfolio.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Lot size for symbols not listed in `instruments`.
    #[serde(default = "default_lot_size")]
    pub default_lot_size: u64,
    #[serde(default)]
    pub instruments: Vec<InstrumentSettings>,
    /// Bars per year, used to annualize the Sharpe ratio (252 for daily bars).
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
}

impl SessionSettings {
    /// Lot sizes keyed by symbol.
    pub fn lot_sizes(&self) -> BTreeMap<String, u64> {
        self.instruments
            .iter()
            .map(|i| (i.symbol.clone(), i.lot_size))
            .collect()
    }
}

/// Per-instrument trading parameters.
#[derive(Deserialize, Debug, Clone)]
pub struct InstrumentSettings {
    pub symbol: String,
    pub lot_size: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            default_lot_size: default_lot_size(),
            instruments: Vec::new(),
            periods_per_year: default_periods_per_year(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ExecutionSettings {
    /// `simulated` or `dry_run`.
    #[serde(default)]
    pub kind: ExecutionKind,
}

/// Helper functions for serde defaults
fn default_initial_capital() -> Decimal { dec!(100_000) }
fn default_lot_size() -> u64 { 1 }
fn default_periods_per_year() -> u32 { 252 }
