//! Structured health reporting for bootstrap and serve lifecycle events.

use std::sync::Arc;

use syncbridge_config::Config;

use crate::bootstrap::BootstrapError;
use crate::payload::PayloadError;
use crate::serve::{PacketSummary, ServeError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after a packet has been dispatched and answered.
    fn packet_completed(&self, summary: &PacketSummary);

    /// Invoked when a payload is answered with a parse error.
    fn packet_rejected(&self, error: &PayloadError);

    /// Invoked when the serve loop stops because of an error.
    fn serve_failed(&self, error: &ServeError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn packet_completed(&self, summary: &PacketSummary) {
        (**self).packet_completed(summary);
    }

    fn packet_rejected(&self, error: &PayloadError) {
        (**self).packet_rejected(error);
    }

    fn serve_failed(&self, error: &ServeError) {
        (**self).serve_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting bridge bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            max_request_bytes = config.max_request_bytes(),
            developer_logging = config.developer_logging(),
            "bridge bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bridge bootstrap failed"
        );
    }

    fn packet_completed(&self, summary: &PacketSummary) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "packet_completed",
            batch = summary.batch,
            requests = summary.requests,
            errors = summary.errors,
            "packet answered"
        );
    }

    fn packet_rejected(&self, error: &PayloadError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "packet_rejected",
            error = %error,
            "payload rejected"
        );
    }

    fn serve_failed(&self, error: &ServeError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "serve_failed",
            error = %error,
            "serve loop stopped"
        );
    }
}
