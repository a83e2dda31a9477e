//! Bridge bootstrap orchestration.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

use syncbridge_config::{Config, ConfigError};
use syncbridge_core::{Dispatcher, DispatcherBuilder};

use crate::health::HealthReporter;
use crate::serve::{self, ServeError, ServeSummary};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer cannot be loaded or the merged
    /// configuration is invalid.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that reads the process arguments and environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_validated(std::env::args_os())
    }
}

/// Loader that parses a fixed argument list instead of the process
/// arguments.
#[derive(Debug, Clone)]
pub struct ArgsConfigLoader {
    args: Vec<OsString>,
}

impl ArgsConfigLoader {
    /// Creates a loader for `args`, whose first item is the program name.
    pub fn new<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl ConfigLoader for ArgsConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load_validated(self.args.iter().cloned())
    }
}

/// Loader returning an already resolved configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// A bootstrapped bridge ready to serve packets.
pub struct Bridge {
    config: Config,
    dispatcher: Dispatcher,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Bridge {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Mutable access to the dispatcher for callers driving it directly.
    pub const fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Serves newline-delimited packets from `reader`, answering on
    /// `writer`, until end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError`] when I/O fails or the dispatcher reports a
    /// configuration problem.
    pub fn serve<R: BufRead, W: Write>(
        &mut self,
        reader: R,
        writer: W,
    ) -> Result<ServeSummary, ServeError> {
        serve::serve(
            &mut self.dispatcher,
            &*self.reporter,
            self.config.max_request_bytes(),
            reader,
            writer,
        )
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the bridge using the supplied collaborators.
///
/// The dispatcher is finished from `builder` after configuration has been
/// applied to it.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails; the
/// reporter is notified before the error is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    builder: DispatcherBuilder,
) -> Result<Bridge, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let dispatcher = builder
        .developer_logging(config.developer_logging())
        .build();
    reporter.bootstrap_succeeded(&config);

    Ok(Bridge {
        config,
        dispatcher,
        telemetry,
        reporter,
    })
}
