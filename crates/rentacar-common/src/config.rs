//! Layered configuration loading
//!
//! Every service configuration is resolved the same way: serialized
//! defaults, then a TOML file, then prefixed environment variables where a
//! double underscore separates nested keys (`RENTACAR_DATABASE__URL`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub trait ConfigLoader: Default + Serialize + DeserializeOwned {
    /// File consulted when no explicit path is given. Missing is not an error.
    const DEFAULT_FILE: &'static str;

    /// Prefix for environment overrides, including the trailing underscore.
    const ENV_PREFIX: &'static str;

    /// Load from an explicit file (which must exist) or the default file.
    fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let figment = Figment::from(Serialized::defaults(Self::default()));

        let figment = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigurationError::FileNotFound {
                        path: p.to_path_buf(),
                    });
                }
                debug!("Loading configuration from {}", p.display());
                figment.merge(Toml::file(p))
            }
            None => {
                debug!("Loading configuration from {} if present", Self::DEFAULT_FILE);
                figment.merge(Toml::file(Self::DEFAULT_FILE))
            }
        };

        figment
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })
    }

    /// Render the defaults as TOML, used by `--gen-config`.
    fn generate_example() -> Result<String, ConfigurationError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }
}
