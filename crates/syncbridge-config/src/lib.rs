//! Layered configuration for the sync bridge.
//!
//! Values are merged from built-in defaults, an optional configuration file,
//! `SYNCBRIDGE_*` environment variables and command-line flags, with later
//! layers taking precedence. A configuration file can be named explicitly
//! with `--config-path` or `SYNCBRIDGE_CONFIG_PATH`.

mod defaults;
mod logging;

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES, default_log_filter, default_log_filter_string,
    default_log_format, default_max_request_bytes,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by the bootstrap sequence and the serve loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SYNCBRIDGE")]
pub struct Config {
    /// Filter directives for the tracing subscriber.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format of log records.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Largest accepted request payload, in bytes.
    #[serde(default = "defaults::default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// Logs every request's parameters, with secrets masked, at debug level.
    #[serde(default)]
    pub developer_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_request_bytes: default_max_request_bytes(),
            developer_logging: false,
        }
    }
}

impl Config {
    /// Filter directives for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format of log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Largest accepted request payload, in bytes.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Whether request parameters are logged for debugging.
    #[must_use]
    pub const fn developer_logging(&self) -> bool {
        self.developer_logging
    }

    /// Checks values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRequestLimit`] when no payload could ever
    /// be accepted.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_bytes == 0 {
            return Err(ConfigError::ZeroRequestLimit);
        }
        Ok(())
    }

    /// Loads and validates configuration from `args` and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be read or merged
    /// and [`ConfigError::ZeroRequestLimit`] when validation fails.
    pub fn load_validated<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Self::load_from_iter(args).map_err(ConfigError::Load)?;
        config.validate()?;
        Ok(config)
    }
}

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration layer could not be loaded.
    #[error("failed to load configuration: {0}")]
    Load(#[source] Arc<OrthoError>),
    /// `max_request_bytes` was zero.
    #[error("max_request_bytes must be greater than zero")]
    ZeroRequestLimit,
}
