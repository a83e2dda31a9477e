//! Application shell for the sync bridge.
//!
//! The crate turns a [`DispatcherBuilder`](syncbridge_core::DispatcherBuilder)
//! populated with endpoint handlers and storage collaborators into a running
//! bridge: configuration is loaded through [`syncbridge_config`], structured
//! telemetry is installed, and newline-delimited request packets are served
//! until end of input.
//!
//! Health reporting hooks emit structured events for each bootstrap stage and
//! for every answered packet, so operators can correlate host batches with
//! their outcomes. Payloads that cannot be parsed are answered with a
//! `-32700` envelope; a dispatcher configuration error stops the loop.

mod bootstrap;
mod health;
mod launch;
pub mod payload;
mod serve;
mod telemetry;

pub use bootstrap::{
    ArgsConfigLoader, BootstrapError, Bridge, ConfigLoader, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use launch::{LaunchError, run_stdio, run_with};
pub use payload::PayloadError;
pub use serve::{PacketSummary, ServeError, ServeSummary, serve};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
