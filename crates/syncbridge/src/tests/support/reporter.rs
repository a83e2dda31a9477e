//! Test double for [`HealthReporter`] that records structured events.

use std::sync::Mutex;

use syncbridge_config::Config;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;
use crate::payload::PayloadError;
use crate::serve::{PacketSummary, ServeError};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed successfully.
    BootstrapSucceeded,
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A packet was dispatched and answered.
    PacketCompleted(PacketSummary),
    /// A payload was answered with a parse error.
    PacketRejected(String),
    /// The serve loop stopped.
    ServeFailed(String),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn packet_completed(&self, summary: &PacketSummary) {
        self.record(HealthEvent::PacketCompleted(*summary));
    }

    fn packet_rejected(&self, error: &PayloadError) {
        self.record(HealthEvent::PacketRejected(error.to_string()));
    }

    fn serve_failed(&self, error: &ServeError) {
        self.record(HealthEvent::ServeFailed(error.to_string()));
    }
}
