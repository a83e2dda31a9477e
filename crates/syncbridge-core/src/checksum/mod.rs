//! Per-entity checksums and change detection.
//!
//! A checksum-bearing entity carries one [`Checksum`] per domain (record,
//! price, stock, variation). The host supplies a fresh `host` value with every
//! sync; [`ChecksumLinker::link`] compares it against the value persisted for
//! the entity's endpoint id and flags the checksum as changed when they
//! differ. Persisted values live behind the [`ChecksumLoader`] collaborator.
//!
//! Rewrites go through [`ChecksumLoader::upsert`], which defaults to a delete
//! followed by a write. A crash between the two leaves no row behind; the
//! next link then sees "no persisted value" and rewrites it, so the store
//! heals itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChecksumStoreError, StoreError};
use crate::model::{DataModel, Identity, ModelType};

/// Tracing target for checksum linking.
const CHECKSUM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::checksum");

/// Discriminates checksum domains within one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumType {
    /// Checksum over the full record.
    Record,
    /// Checksum over prices.
    Price,
    /// Checksum over stock levels.
    Stock,
    /// Checksum over product variations.
    Variation,
}

/// A change-detection fingerprint for one domain of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checksum {
    /// Identity of the owning entity.
    #[serde(default)]
    pub foreign_key: Identity,
    /// Checksum domain.
    #[serde(rename = "type")]
    pub checksum_type: ChecksumType,
    /// Value computed by the host for this sync.
    pub host: String,
    /// Value persisted on the endpoint side, filled in by linking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Whether the host value differs from the persisted one.
    #[serde(default)]
    pub has_changed: bool,
}

impl Checksum {
    /// Creates a checksum with a host-supplied value.
    pub fn new(checksum_type: ChecksumType, host: impl Into<String>) -> Self {
        Self {
            foreign_key: Identity::unlinked(),
            checksum_type,
            host: host.into(),
            endpoint: None,
            has_changed: false,
        }
    }

    /// Attaches the owning entity's identity.
    #[must_use]
    pub fn with_foreign_key(mut self, foreign_key: Identity) -> Self {
        self.foreign_key = foreign_key;
        self
    }
}

/// Capability of entities that carry checksums.
pub trait ChecksumBearing {
    /// Returns the entity's checksum records.
    fn checksum_records(&self) -> &[Checksum];

    /// Returns mutable access to the entity's checksum records.
    fn checksum_records_mut(&mut self) -> &mut [Checksum];
}

impl ChecksumBearing for Vec<Checksum> {
    fn checksum_records(&self) -> &[Checksum] {
        self
    }

    fn checksum_records_mut(&mut self) -> &mut [Checksum] {
        self
    }
}

/// Key under which a persisted checksum value is stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChecksumKey {
    /// Type of the owning entity.
    pub model_type: ModelType,
    /// Endpoint id of the owning entity.
    pub endpoint_id: String,
    /// Checksum domain.
    pub checksum_type: ChecksumType,
}

impl ChecksumKey {
    /// Creates a key.
    pub fn new(
        model_type: ModelType,
        endpoint_id: impl Into<String>,
        checksum_type: ChecksumType,
    ) -> Self {
        Self {
            model_type,
            endpoint_id: endpoint_id.into(),
            checksum_type,
        }
    }
}

/// Backing store for persisted checksum values.
///
/// At most one value exists per [`ChecksumKey`].
pub trait ChecksumLoader: Send {
    /// Reads the persisted value, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn read(&self, key: &ChecksumKey) -> Result<Option<String>, StoreError>;

    /// Writes a value for a key that currently has none.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn write(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError>;

    /// Deletes the value for a key; deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn delete(&mut self, key: &ChecksumKey) -> Result<(), StoreError>;

    /// Replaces the value for a key.
    ///
    /// The default deletes then writes. Stores with an atomic upsert should
    /// override this.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if either step fails.
    fn upsert(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        self.delete(key)?;
        self.write(key, value)
    }
}

impl<T: ChecksumLoader + ?Sized> ChecksumLoader for Box<T> {
    fn read(&self, key: &ChecksumKey) -> Result<Option<String>, StoreError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        (**self).write(key, value)
    }

    fn delete(&mut self, key: &ChecksumKey) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn upsert(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        (**self).upsert(key, value)
    }
}

/// Links entity checksums against the persisted store.
pub struct ChecksumLinker {
    loader: Box<dyn ChecksumLoader>,
}

impl std::fmt::Debug for ChecksumLinker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumLinker").finish_non_exhaustive()
    }
}

impl ChecksumLinker {
    /// Creates a linker backed by `loader`.
    pub fn new(loader: impl ChecksumLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
        }
    }

    /// Links every checksum of `model` matching `filter` (all when `None`).
    ///
    /// Entities without checksums pass through untouched. The updated model
    /// is returned so callers reassign it rather than relying on aliasing.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumStoreError`] if the store fails; the model is
    /// dropped in that case because its flags are no longer trustworthy.
    pub fn link<M: DataModel>(
        &mut self,
        mut model: M,
        filter: Option<ChecksumType>,
    ) -> Result<M, ChecksumStoreError> {
        let model_type = model.model_type();
        let endpoint_id = endpoint_id_of(&model);
        if let Some(bearing) = model.checksums_mut() {
            for checksum in bearing.checksum_records_mut() {
                if filter.is_some_and(|wanted| wanted != checksum.checksum_type) {
                    continue;
                }
                match endpoint_id.as_deref() {
                    Some(endpoint_id) => self.link_one(model_type, endpoint_id, checksum)?,
                    None => {
                        debug!(
                            target: CHECKSUM_TARGET,
                            %model_type,
                            checksum_type = ?checksum.checksum_type,
                            "checksum of unlinked entity marked as changed"
                        );
                        checksum.has_changed = true;
                    }
                }
            }
        }
        Ok(model)
    }

    /// Removes every persisted checksum of a delete-linked model.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumStoreError`] if the store fails.
    pub fn unlink<M: DataModel>(&mut self, model: M) -> Result<M, ChecksumStoreError> {
        let Some(endpoint_id) = endpoint_id_of(&model) else {
            return Ok(model);
        };
        let checksum_types: Vec<ChecksumType> = records(&model)
            .map(|checksum| checksum.checksum_type)
            .collect();
        self.remove(model.model_type(), &endpoint_id, &checksum_types)?;
        Ok(model)
    }

    /// Removes the persisted values of `checksum_types` for one entity.
    ///
    /// Used once a delete has been handled, when the deleted entity itself
    /// may no longer be around.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumStoreError`] if the store fails.
    pub fn remove(
        &mut self,
        model_type: ModelType,
        endpoint_id: &str,
        checksum_types: &[ChecksumType],
    ) -> Result<(), ChecksumStoreError> {
        for checksum_type in checksum_types {
            let key = ChecksumKey::new(model_type, endpoint_id, *checksum_type);
            self.loader
                .delete(&key)
                .map_err(|source| store_error("delete", &key, source))?;
        }
        debug!(
            target: CHECKSUM_TARGET,
            %model_type,
            endpoint_id,
            "checksums removed"
        );
        Ok(())
    }

    /// Persists an acknowledged checksum.
    ///
    /// Returns `false` without touching the store unless the checksum's
    /// foreign key carries both an endpoint and a host id.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumStoreError`] if the store fails.
    pub fn save(
        &mut self,
        model_type: ModelType,
        checksum: &Checksum,
    ) -> Result<bool, ChecksumStoreError> {
        let (Some(endpoint_id), Some(_)) =
            (checksum.foreign_key.endpoint(), checksum.foreign_key.host())
        else {
            return Ok(false);
        };
        let key = ChecksumKey::new(model_type, endpoint_id, checksum.checksum_type);
        self.loader
            .upsert(&key, &checksum.host)
            .map_err(|source| store_error("write", &key, source))?;
        Ok(true)
    }

    fn link_one(
        &mut self,
        model_type: ModelType,
        endpoint_id: &str,
        checksum: &mut Checksum,
    ) -> Result<(), ChecksumStoreError> {
        let key = ChecksumKey::new(model_type, endpoint_id, checksum.checksum_type);
        let persisted = self
            .loader
            .read(&key)
            .map_err(|source| store_error("read", &key, source))?
            .filter(|value| !value.is_empty());

        match persisted.as_deref() {
            None => {
                debug!(target: CHECKSUM_TARGET, ?key, "writing new checksum");
                self.loader
                    .write(&key, &checksum.host)
                    .map_err(|source| store_error("write", &key, source))?;
                checksum.has_changed = true;
            }
            Some(value) if value != checksum.host => {
                debug!(target: CHECKSUM_TARGET, ?key, "checksum changed");
                self.loader
                    .upsert(&key, &checksum.host)
                    .map_err(|source| store_error("write", &key, source))?;
                checksum.has_changed = true;
            }
            Some(_) => checksum.has_changed = false,
        }
        checksum.endpoint = persisted;
        Ok(())
    }
}

/// Returns the first checksum of `model` with the given type.
#[must_use]
pub fn find<M: DataModel + ?Sized>(model: &M, checksum_type: ChecksumType) -> Option<&Checksum> {
    records(model).find(|checksum| checksum.checksum_type == checksum_type)
}

/// Returns the first checksum with the given type whose foreign key carries
/// `endpoint`.
#[must_use]
pub fn find_by_endpoint<'a, M: DataModel + ?Sized>(
    model: &'a M,
    endpoint: &str,
    checksum_type: ChecksumType,
) -> Option<&'a Checksum> {
    records(model).find(|checksum| {
        checksum.checksum_type == checksum_type && checksum.foreign_key.endpoint() == Some(endpoint)
    })
}

/// Returns the first checksum with the given type whose foreign key carries
/// `host`.
#[must_use]
pub fn find_by_host<'a, M: DataModel + ?Sized>(
    model: &'a M,
    host: &str,
    checksum_type: ChecksumType,
) -> Option<&'a Checksum> {
    records(model).find(|checksum| {
        checksum.checksum_type == checksum_type && checksum.foreign_key.host() == Some(host)
    })
}

fn records<M: DataModel + ?Sized>(model: &M) -> impl Iterator<Item = &Checksum> {
    model
        .checksums()
        .map(|bearing| bearing.checksum_records())
        .unwrap_or_default()
        .iter()
}

fn endpoint_id_of<M: DataModel + ?Sized>(model: &M) -> Option<String> {
    model
        .identity()
        .and_then(Identity::endpoint)
        .map(str::to_owned)
}

fn store_error(operation: &'static str, key: &ChecksumKey, source: StoreError) -> ChecksumStoreError {
    ChecksumStoreError {
        operation,
        model_type: key.model_type,
        endpoint_id: key.endpoint_id.clone(),
        source,
    }
}
