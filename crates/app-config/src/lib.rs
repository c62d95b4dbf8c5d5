// In crates/app-config/src/lib.rs

use config::{Config, Environment, File, FileFormat};

pub mod error;
pub mod types;

// Re-export the most important types for easy access.
pub use error::{Error, Result};
pub use types::{AppSettings, ExecutionSettings, InstrumentSettings, SessionSettings, Settings};

/// Loads the application settings from various sources.
///
/// This function orchestrates the layered configuration loading:
/// 1. Reads from a default `base.toml` file in `dir`.
/// 2. Merges settings from an environment-specific file (e.g., `development.toml`).
/// 3. Merges settings from environment variables.
pub fn load_settings_from(dir: &str) -> Result<Settings> {
    // Get the current environment. Default to "development" if not set.
    let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

    let settings = Config::builder()
        .add_source(File::with_name(&format!("{dir}/base")))
        .add_source(File::with_name(&format!("{dir}/{environment}")).required(false))
        // e.g. `APP_RISK__RISK_FRACTION=0.02`
        .add_source(Environment::with_prefix("APP").prefix_separator("_").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

/// Loads settings from the `config/` directory of the working directory.
pub fn load_settings() -> Result<Settings> {
    load_settings_from("config")
}

/// Parses settings from TOML text, without files or environment overrides.
pub fn from_toml_str(content: &str) -> Result<Settings> {
    let settings: Settings = Config::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<()> {
    settings
        .risk
        .validate()
        .map_err(|e| Error::Invalid(e.to_string()))?;
    if settings.session.default_lot_size == 0 {
        return Err(Error::Invalid("default_lot_size must be positive".into()));
    }
    if settings.session.periods_per_year == 0 {
        return Err(Error::Invalid("periods_per_year must be positive".into()));
    }
    if let Some(bad) = settings.session.instruments.iter().find(|i| i.lot_size == 0) {
        return Err(Error::Invalid(format!("lot_size of {} must be positive", bad.symbol)));
    }
    Ok(())
}
