//! In-memory reference stores.
//!
//! Both stores are complete implementations of their collaborator traits and
//! suit tests and ephemeral deployments. Nothing here survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::checksum::{ChecksumKey, ChecksumLoader};
use crate::error::StoreError;
use crate::identity::PrimaryKeyMapper;
use crate::model::ModelType;

#[derive(Debug, Default, Clone)]
struct Links {
    by_endpoint: HashMap<String, String>,
    by_host: HashMap<String, String>,
}

impl Links {
    fn insert(&mut self, endpoint_id: &str, host_id: &str) {
        self.remove_endpoint(endpoint_id);
        self.remove_host(host_id);
        self.by_endpoint
            .insert(endpoint_id.to_owned(), host_id.to_owned());
        self.by_host
            .insert(host_id.to_owned(), endpoint_id.to_owned());
    }

    fn remove_endpoint(&mut self, endpoint_id: &str) {
        if let Some(host_id) = self.by_endpoint.remove(endpoint_id) {
            self.by_host.remove(&host_id);
        }
    }

    fn remove_host(&mut self, host_id: &str) {
        if let Some(endpoint_id) = self.by_host.remove(host_id) {
            self.by_endpoint.remove(&endpoint_id);
        }
    }
}

/// Primary-key mapper holding per-type bijective maps.
///
/// Host ids are assigned from a per-type counter starting at 1, skipping ids
/// already in use.
#[derive(Debug, Default, Clone)]
pub struct MemoryPrimaryKeyMapper {
    links: HashMap<ModelType, Links>,
    next_host_id: HashMap<ModelType, u64>,
}

impl MemoryPrimaryKeyMapper {
    /// Creates an empty mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of links stored for a type.
    #[must_use]
    pub fn len(&self, model_type: ModelType) -> usize {
        self.links
            .get(&model_type)
            .map_or(0, |links| links.by_endpoint.len())
    }

    /// Returns `true` when no links are stored for any type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.values().all(|links| links.by_endpoint.is_empty())
    }
}

impl PrimaryKeyMapper for MemoryPrimaryKeyMapper {
    fn host_id(
        &self,
        model_type: ModelType,
        endpoint_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .links
            .get(&model_type)
            .and_then(|links| links.by_endpoint.get(endpoint_id))
            .cloned())
    }

    fn endpoint_id(
        &self,
        model_type: ModelType,
        host_id: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .links
            .get(&model_type)
            .and_then(|links| links.by_host.get(host_id))
            .cloned())
    }

    fn assign_host_id(
        &mut self,
        model_type: ModelType,
        endpoint_id: &str,
    ) -> Result<String, StoreError> {
        let links = self.links.entry(model_type).or_default();
        let counter = self.next_host_id.entry(model_type).or_insert(1);
        let host_id = loop {
            let candidate = counter.to_string();
            *counter = counter
                .checked_add(1)
                .ok_or_else(|| StoreError::new("host id space exhausted"))?;
            if !links.by_host.contains_key(&candidate) {
                break candidate;
            }
        };
        links.insert(endpoint_id, &host_id);
        Ok(host_id)
    }

    fn save(
        &mut self,
        model_type: ModelType,
        endpoint_id: &str,
        host_id: &str,
    ) -> Result<(), StoreError> {
        self.links
            .entry(model_type)
            .or_default()
            .insert(endpoint_id, host_id);
        Ok(())
    }

    fn delete_by_endpoint(
        &mut self,
        model_type: ModelType,
        endpoint_id: &str,
    ) -> Result<(), StoreError> {
        if let Some(links) = self.links.get_mut(&model_type) {
            links.remove_endpoint(endpoint_id);
        }
        Ok(())
    }

    fn delete_by_host(&mut self, model_type: ModelType, host_id: &str) -> Result<(), StoreError> {
        if let Some(links) = self.links.get_mut(&model_type) {
            links.remove_host(host_id);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.links.clear();
        self.next_host_id.clear();
        Ok(())
    }
}

/// Checksum store backed by an ordered map.
#[derive(Debug, Default, Clone)]
pub struct MemoryChecksumStore {
    values: BTreeMap<ChecksumKey, String>,
}

impl MemoryChecksumStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the persisted value for a key.
    #[must_use]
    pub fn get(&self, key: &ChecksumKey) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the number of persisted values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when nothing is persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ChecksumLoader for MemoryChecksumStore {
    fn read(&self, key: &ChecksumKey) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.clone(), value.to_owned());
        Ok(())
    }

    fn delete(&mut self, key: &ChecksumKey) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }

    fn upsert(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        self.write(key, value)
    }
}

/// Cloneable handle to a [`MemoryChecksumStore`].
///
/// The dispatcher owns its loader; handing it one clone while keeping
/// another lets callers inspect what was persisted.
#[derive(Debug, Default, Clone)]
pub struct SharedChecksumStore {
    inner: Arc<Mutex<MemoryChecksumStore>>,
}

impl SharedChecksumStore {
    /// Creates an empty shared store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the persisted value for a key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store lock is poisoned.
    pub fn get(&self, key: &ChecksumKey) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).map(str::to_owned))
    }

    /// Returns the number of persisted values.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryChecksumStore>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::new("checksum store lock poisoned"))
    }
}

impl ChecksumLoader for SharedChecksumStore {
    fn read(&self, key: &ChecksumKey) -> Result<Option<String>, StoreError> {
        self.lock()?.read(key)
    }

    fn write(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        self.lock()?.write(key, value)
    }

    fn delete(&mut self, key: &ChecksumKey) -> Result<(), StoreError> {
        self.lock()?.delete(key)
    }

    fn upsert(&mut self, key: &ChecksumKey, value: &str) -> Result<(), StoreError> {
        self.lock()?.upsert(key, value)
    }
}
