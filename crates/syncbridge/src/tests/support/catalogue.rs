//! A small product endpoint backed by fixed data.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use syncbridge_core::DispatcherBuilder;
use syncbridge_core::checksum::{Checksum, ChecksumBearing, ChecksumType};
use syncbridge_core::error::HandlerError;
use syncbridge_core::handler::{
    ActionOutput, ActionParams, ActionRequest, ActionResult, EndpointHandler,
    StaticTokenValidator,
};
use syncbridge_core::memory::{MemoryChecksumStore, MemoryPrimaryKeyMapper};
use syncbridge_core::method::Action;
use syncbridge_core::model::{BoxedModel, DataModel, Identity, ModelType, decode_models};

/// Token accepted by dispatchers built with [`dispatcher_builder`].
pub const TOKEN: &str = "bridge-token";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Product {
    #[serde(default)]
    id: Identity,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    checksums: Vec<Checksum>,
}

impl DataModel for Product {
    fn model_type(&self) -> ModelType {
        ModelType::Product
    }

    fn identity(&self) -> Option<&Identity> {
        Some(&self.id)
    }

    fn identity_mut(&mut self) -> Option<&mut Identity> {
        Some(&mut self.id)
    }

    fn checksums(&self) -> Option<&dyn ChecksumBearing> {
        Some(&self.checksums)
    }

    fn checksums_mut(&mut self) -> Option<&mut dyn ChecksumBearing> {
        Some(&mut self.checksums)
    }

    fn to_public(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Endpoint serving `product.pull`, `product.push` and `product.statistic`.
#[derive(Debug, Default)]
pub struct CatalogueEndpoint;

impl EndpointHandler for CatalogueEndpoint {
    fn can_handle(&self, action: Action) -> bool {
        matches!(action, Action::Pull | Action::Push | Action::Statistic)
    }

    fn decode_models(&self, params: Value) -> Result<Vec<BoxedModel>, serde_json::Error> {
        decode_models::<Product>(params)
    }

    fn handle(&mut self, request: ActionRequest) -> Result<ActionResult, HandlerError> {
        let output = match (request.method.action(), request.params) {
            (Action::Statistic, _) => ActionOutput::Value(json!({ "available": 1 })),
            (Action::Push, ActionParams::Models(models)) => ActionOutput::Models(models),
            _ => ActionOutput::Models(vec![Box::new(Product {
                id: Identity::from_endpoint("sku-1"),
                sku: String::from("SKU-1"),
                checksums: vec![Checksum::new(ChecksumType::Record, "r1")],
            })]),
        };
        Ok(ActionResult::handled(output))
    }
}

/// Returns a builder with every collaborator registered.
pub fn dispatcher_builder() -> DispatcherBuilder {
    DispatcherBuilder::new()
        .endpoint("product", CatalogueEndpoint)
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .checksum_loader(MemoryChecksumStore::new())
        .token_validator(StaticTokenValidator::new(TOKEN))
}

/// Returns a builder lacking a checksum loader.
pub fn dispatcher_builder_without_checksums() -> DispatcherBuilder {
    DispatcherBuilder::new()
        .endpoint("product", CatalogueEndpoint)
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .token_validator(StaticTokenValidator::new(TOKEN))
}
