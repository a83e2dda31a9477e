//! Explicit registration of dispatcher collaborators.

use std::collections::HashMap;

use super::Dispatcher;
use crate::checksum::{ChecksumLinker, ChecksumLoader};
use crate::handler::{CONNECTOR_CONTROLLER, ConnectorCore, CoreHandler, EndpointHandler, TokenValidator};
use crate::hooks::{HookSink, Hooks};
use crate::identity::{IdentityMap, PrimaryKeyMapper};
use crate::model::ModelType;

/// Builder for [`Dispatcher`].
///
/// The built-in [`ConnectorCore`] is registered under `connector`; every
/// other collaborator must be supplied. Missing collaborators are reported
/// by [`Dispatcher::dispatch`] as configuration errors, not here.
pub struct DispatcherBuilder {
    endpoints: HashMap<String, Box<dyn EndpointHandler>>,
    cores: HashMap<String, Box<dyn CoreHandler>>,
    identities: IdentityMap,
    checksums: Option<ChecksumLinker>,
    tokens: Option<Box<dyn TokenValidator>>,
    hooks: Hooks,
    developer_logging: bool,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    /// Creates a builder with only the connector core registered.
    #[must_use]
    pub fn new() -> Self {
        let mut cores: HashMap<String, Box<dyn CoreHandler>> = HashMap::new();
        cores.insert(CONNECTOR_CONTROLLER.to_owned(), Box::new(ConnectorCore));
        Self {
            endpoints: HashMap::new(),
            cores,
            identities: IdentityMap::new(),
            checksums: None,
            tokens: None,
            hooks: Hooks::new(),
            developer_logging: false,
        }
    }

    /// Registers the endpoint handler for a controller.
    #[must_use]
    pub fn endpoint(
        mut self,
        controller: impl Into<String>,
        handler: impl EndpointHandler + 'static,
    ) -> Self {
        self.endpoints.insert(controller.into(), Box::new(handler));
        self
    }

    /// Registers a core handler, replacing any handler for the controller.
    #[must_use]
    pub fn core(mut self, controller: impl Into<String>, handler: impl CoreHandler + 'static) -> Self {
        self.cores.insert(controller.into(), Box::new(handler));
        self
    }

    /// Registers the primary-key mapper for one entity type.
    #[must_use]
    pub fn primary_key_mapper(
        mut self,
        model_type: ModelType,
        mapper: impl PrimaryKeyMapper + 'static,
    ) -> Self {
        self.identities.register(model_type, mapper);
        self
    }

    /// Registers the primary-key mapper for types without a dedicated one.
    #[must_use]
    pub fn default_primary_key_mapper(mut self, mapper: impl PrimaryKeyMapper + 'static) -> Self {
        self.identities.register_fallback(mapper);
        self
    }

    /// Sets the checksum loader.
    #[must_use]
    pub fn checksum_loader(mut self, loader: impl ChecksumLoader + 'static) -> Self {
        self.checksums = Some(ChecksumLinker::new(loader));
        self
    }

    /// Sets the authentication mechanism.
    #[must_use]
    pub fn token_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.tokens = Some(Box::new(validator));
        self
    }

    /// Appends a hook sink.
    #[must_use]
    pub fn hook(mut self, sink: impl HookSink + 'static) -> Self {
        self.hooks.register(sink);
        self
    }

    /// Enables debug logging of masked request parameters.
    #[must_use]
    pub const fn developer_logging(mut self, enabled: bool) -> Self {
        self.developer_logging = enabled;
        self
    }

    /// Finishes the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            endpoints: self.endpoints,
            cores: self.cores,
            identities: self.identities,
            checksums: self.checksums,
            tokens: self.tokens,
            hooks: self.hooks,
            developer_logging: self.developer_logging,
        }
    }
}
