//! Shared test doubles for unit tests across the crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::{Checksum, ChecksumBearing, ChecksumType};
use crate::model::{DataModel, Identity, ModelType};

/// Minimal syncable product carrying checksums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestProduct {
    #[serde(default)]
    pub(crate) id: Identity,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) checksums: Vec<Checksum>,
}

impl TestProduct {
    pub(crate) fn new(id: Identity) -> Self {
        Self {
            id,
            name: String::from("widget"),
            checksums: Vec::new(),
        }
    }

    pub(crate) fn with_checksum(mut self, checksum_type: ChecksumType, host: &str) -> Self {
        self.checksums.push(Checksum::new(checksum_type, host));
        self
    }

    pub(crate) fn checksum(&self, checksum_type: ChecksumType) -> &Checksum {
        crate::checksum::find(self, checksum_type).expect("checksum should be present")
    }
}

impl DataModel for TestProduct {
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

/// Syncable category without checksums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TestCategory {
    #[serde(default)]
    pub(crate) id: Identity,
}

impl TestCategory {
    pub(crate) fn new(id: Identity) -> Self {
        Self { id }
    }
}

impl DataModel for TestCategory {
    fn model_type(&self) -> ModelType {
        ModelType::Category
    }

    fn identity(&self) -> Option<&Identity> {
        Some(&self.id)
    }

    fn identity_mut(&mut self) -> Option<&mut Identity> {
        Some(&mut self.id)
    }

    fn to_public(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
