//! Process configuration.
//!
//! Layered with the `config` crate: struct defaults, then an optional TOML
//! file, then `OTAC__`-prefixed environment variables with `__` between
//! nesting levels (for example `OTAC__DATABASE__URL`).

use std::path::Path;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use otac_core::validation::Limits;
use otac_db::DbConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "OTAC_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "otac.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DbConfig,
    pub log: LogConfig,
    pub limits: Limits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "otac=info".into(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (skipped when missing) and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        build(Config::builder().add_source(File::from(path.as_ref()).required(false)))
    }

    /// Load from the file named by `OTAC_CONFIG`, or `otac.toml`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load(path)
    }
}

fn build(builder: ConfigBuilder<DefaultState>) -> Result<AppConfig, ConfigError> {
    builder
        .add_source(
            Environment::with_prefix("OTAC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load("/nonexistent/otac.toml").unwrap();
        assert_eq!(config.log.level, "otac=info");
        assert_eq!(config.limits, Limits::default());
        assert_eq!(config.database.namespace, "otac");
    }

    #[test]
    fn file_values_override_defaults() {
        let toml = r#"
            [database]
            url = "db.internal:8000"

            [log]
            level = "otac=debug"

            [limits]
            max_page_size = 50
        "#;
        let config =
            build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml))).unwrap();
        assert_eq!(config.database.url, "db.internal:8000");
        assert_eq!(config.database.database, "access");
        assert_eq!(config.log.level, "otac=debug");
        assert_eq!(config.limits.max_page_size, 50);
        assert_eq!(config.limits.max_batch, Limits::default().max_batch);
    }
}
