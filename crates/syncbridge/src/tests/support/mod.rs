//! Test harness utilities for the bridge behavioural suites.

mod catalogue;
mod reporter;
mod world;

pub use catalogue::{TOKEN, dispatcher_builder};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{BridgeWorld, world};
