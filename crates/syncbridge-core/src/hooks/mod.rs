//! Before/after notifications around every request and reconciled entity.
//!
//! Sinks observe the pipeline; they cannot steer it. A failing sink is
//! logged and the remaining sinks still run.

use serde_json::Value;
use tracing::warn;

use crate::error::HookError;
use crate::method::Action;
use crate::model::{DataModel, QueryFilter};

/// Tracing target for hook delivery.
const HOOKS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::hooks");

/// Whether an event fires before or after the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the handler runs.
    Before,
    /// After reconciliation.
    After,
}

impl HookPhase {
    /// Returns the phase token used in event names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// What an event carries.
#[derive(Debug, Clone, Copy)]
pub enum HookSubject<'a> {
    /// Raw request parameters (before) or the response envelope (after).
    Rpc(&'a Value),
    /// One decoded or reconciled entity.
    Model(&'a dyn DataModel),
    /// Pull or statistic query filter.
    Filter(&'a QueryFilter),
}

/// A single notification.
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    /// Controller token of the request.
    pub controller: &'a str,
    /// Action of the request.
    pub action: Action,
    /// Phase of the event.
    pub phase: HookPhase,
    /// Payload of the event.
    pub subject: HookSubject<'a>,
}

impl HookEvent<'_> {
    /// Returns the stable event name, e.g. `product.before.push` or
    /// `rpc.product.after.pull`.
    #[must_use]
    pub fn name(&self) -> String {
        let scope = match self.subject {
            HookSubject::Rpc(_) => "rpc.",
            HookSubject::Model(_) | HookSubject::Filter(_) => "",
        };
        format!(
            "{scope}{}.{}.{}",
            self.controller,
            self.phase.as_str(),
            self.action
        )
    }
}

/// Receiver of hook events.
pub trait HookSink: Send {
    /// Returns a name identifying the sink in diagnostics.
    fn name(&self) -> &str;

    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] when the sink fails; the pipeline logs and
    /// ignores it.
    fn notify(&mut self, event: &HookEvent<'_>) -> Result<(), HookError>;
}

/// Ordered fan-out to every registered sink.
#[derive(Default)]
pub struct Hooks {
    sinks: Vec<Box<dyn HookSink>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|sink| sink.name()))
            .finish()
    }
}

impl Hooks {
    /// Creates an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sink.
    pub fn register(&mut self, sink: impl HookSink + 'static) {
        self.sinks.push(Box::new(sink));
    }

    /// Returns the number of registered sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` when no sinks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Delivers an event to every sink in registration order.
    pub fn emit(&mut self, event: &HookEvent<'_>) {
        for sink in &mut self.sinks {
            if let Err(error) = sink.notify(event) {
                warn!(
                    target: HOOKS_TARGET,
                    event = %event.name(),
                    sink = %error.sink,
                    message = %error.message,
                    "hook sink failed"
                );
            }
        }
    }
}
