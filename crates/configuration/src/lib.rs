//! # Configuration
//!
//! Strongly-typed settings for the engine, position sizing, strategies and the
//! batch runner. Every section has defaults, so an empty file is a valid
//! configuration. Values are loaded once and handed to each engine instance as
//! an immutable value; nothing in the workspace reads ambient global state.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    BatchConfig, Config, EngineConfig, MaCrossoverParams, RsiParams, SizingConfig, SizingMethod, SortKey,
    StrategyConfig,
};

/// Prefix for environment overrides, e.g. `BACKTEST__ENGINE__LOT_SIZE=200`.
pub const ENV_PREFIX: &str = "BACKTEST";

/// Loads the application configuration from a TOML file.
///
/// A missing file is not an error: defaults apply and environment variables
/// with the `BACKTEST__` prefix can still override individual keys. The result
/// is validated before it is returned.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}
