//! Entry points wiring bootstrap and the serve loop together.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

use syncbridge_core::DispatcherBuilder;

use crate::bootstrap::{BootstrapError, ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::serve::{ServeError, ServeSummary};

/// Errors that end a bridge run.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap failed before any packet was read.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The serve loop stopped on an error.
    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// Runs the bridge over standard input and output.
///
/// Configuration comes from the process arguments and environment; health
/// events are logged through `tracing`.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap or the serve loop fails.
pub fn run_stdio(builder: DispatcherBuilder) -> Result<ServeSummary, LaunchError> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        builder,
        stdin.lock(),
        stdout.lock(),
    )
}

/// Bootstraps the bridge and serves `reader` until end of input.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap or the serve loop fails.
pub fn run_with<R: BufRead, W: Write>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    builder: DispatcherBuilder,
    reader: R,
    writer: W,
) -> Result<ServeSummary, LaunchError> {
    let mut bridge = bootstrap_with(loader, reporter, builder)?;
    Ok(bridge.serve(reader, writer)?)
}
