//! Scenario world holding the loader, reporter, bridge and serve results.

use std::cell::RefCell;
use std::io::Cursor;
use std::sync::Arc;

use serde_json::Value;
use syncbridge_config::Config;
use syncbridge_core::protocol::RpcRequest;

use crate::bootstrap::{BootstrapError, Bridge, ConfigLoader, StaticConfigLoader, bootstrap_with};
use crate::serve::{ServeError, ServeSummary};

use super::catalogue::{dispatcher_builder, dispatcher_builder_without_checksums};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct BridgeWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    bridge: Option<Bridge>,
    bootstrap_error: Option<BootstrapError>,
    input: Vec<u8>,
    next_id: i64,
    output: Vec<u8>,
    serve_result: Option<Result<ServeSummary, ServeError>>,
}

impl BridgeWorld {
    /// Builds a world with a default configuration.
    pub fn new() -> Self {
        Self {
            loader: Box::new(StaticConfigLoader::new(Config::default())),
            reporter: Arc::new(RecordingHealthReporter::default()),
            bridge: None,
            bootstrap_error: None,
            input: Vec::new(),
            next_id: 1,
            output: Vec::new(),
            serve_result: None,
        }
    }

    /// Replaces the configuration handed to bootstrap.
    pub fn use_config(&mut self, config: Config) {
        self.loader = Box::new(StaticConfigLoader::new(config));
    }

    /// Runs the bootstrap sequence with a complete dispatcher.
    pub fn bootstrap(&mut self) {
        self.bootstrap_from(dispatcher_builder());
    }

    /// Runs the bootstrap sequence with a dispatcher lacking a checksum loader.
    pub fn bootstrap_without_checksums(&mut self) {
        self.bootstrap_from(dispatcher_builder_without_checksums());
    }

    fn bootstrap_from(&mut self, builder: syncbridge_core::DispatcherBuilder) {
        match bootstrap_with(&*self.loader, self.reporter.clone(), builder) {
            Ok(bridge) => self.bridge = Some(bridge),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Returns the bootstrap error, if any.
    pub const fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns the bootstrapped bridge, if any.
    pub const fn bridge(&self) -> Option<&Bridge> {
        self.bridge.as_ref()
    }

    /// Queues a request line for `method`.
    pub fn queue_request(&mut self, method: &str, params: Value) {
        let request = RpcRequest::new(self.next_id, method, params);
        self.next_id += 1;
        let line = serde_json::to_vec(&request).expect("request should encode");
        self.queue_line(&line);
    }

    /// Queues raw bytes followed by a newline.
    pub fn queue_line(&mut self, line: &[u8]) {
        self.input.extend_from_slice(line);
        self.input.push(b'\n');
    }

    /// Serves every queued line.
    pub fn serve(&mut self) {
        let bridge = self.bridge.as_mut().expect("bridge should be bootstrapped");
        let reader = Cursor::new(std::mem::take(&mut self.input));
        self.serve_result = Some(bridge.serve(reader, &mut self.output));
    }

    /// Returns the serve result.
    pub fn serve_result(&self) -> &Result<ServeSummary, ServeError> {
        self.serve_result.as_ref().expect("serve should have run")
    }

    /// Parses every written response line.
    pub fn response_lines(&self) -> Vec<Value> {
        self.output
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_slice(line).expect("response line should be JSON"))
            .collect()
    }
}

impl Default for BridgeWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default world fixture.
pub fn world() -> RefCell<BridgeWorld> {
    RefCell::new(BridgeWorld::new())
}
