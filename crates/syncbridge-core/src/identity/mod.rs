//! Bidirectional identity mapping between host and endpoint id spaces.
//!
//! The [`IdentityMap`] owns one [`PrimaryKeyMapper`] per entity type (plus
//! an optional default) and keeps the stored links a bijection per type: a
//! host id maps to at most one endpoint id and vice versa. Every write is
//! preceded by a conflict check, so a rejected link leaves the store exactly
//! as it was.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{LinkerError, StoreError};
use crate::model::{DataModel, Identity, ModelType};

/// Tracing target for identity linking.
const IDENTITY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::identity");

/// Durable store of `(type, host, endpoint)` links.
pub trait PrimaryKeyMapper: Send {
    /// Looks up the host id linked to an endpoint id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn host_id(&self, model_type: ModelType, endpoint_id: &str)
    -> Result<Option<String>, StoreError>;

    /// Looks up the endpoint id linked to a host id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn endpoint_id(&self, model_type: ModelType, host_id: &str)
    -> Result<Option<String>, StoreError>;

    /// Generates a host id for an endpoint id and persists the link.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn assign_host_id(&mut self, model_type: ModelType, endpoint_id: &str)
    -> Result<String, StoreError>;

    /// Persists a link between both ids.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn save(&mut self, model_type: ModelType, endpoint_id: &str, host_id: &str)
    -> Result<(), StoreError>;

    /// Removes the link holding an endpoint id; a missing link is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn delete_by_endpoint(&mut self, model_type: ModelType, endpoint_id: &str)
    -> Result<(), StoreError>;

    /// Removes the link holding a host id; a missing link is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn delete_by_host(&mut self, model_type: ModelType, host_id: &str) -> Result<(), StoreError>;

    /// Removes every link.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be written.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// How [`IdentityMap::link`] treats missing mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Resolve and create mappings (pull and push).
    Assign,
    /// Only resolve existing mappings (delete).
    Resolve,
}

impl LinkMode {
    /// Returns the mode used for results of the given action.
    #[must_use]
    pub const fn for_delete(is_delete: bool) -> Self {
        if is_delete { Self::Resolve } else { Self::Assign }
    }
}

/// Registry of primary-key mappers and the linking algorithm over them.
#[derive(Default)]
pub struct IdentityMap {
    mappers: HashMap<ModelType, Box<dyn PrimaryKeyMapper>>,
    fallback: Option<Box<dyn PrimaryKeyMapper>>,
}

impl fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMap")
            .field("types", &self.mappers.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl IdentityMap {
    /// Creates a map without mappers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mapper for one entity type, replacing any previous one.
    pub fn register(&mut self, model_type: ModelType, mapper: impl PrimaryKeyMapper + 'static) {
        self.mappers.insert(model_type, Box::new(mapper));
    }

    /// Registers the mapper used for types without a dedicated one.
    pub fn register_fallback(&mut self, mapper: impl PrimaryKeyMapper + 'static) {
        self.fallback = Some(Box::new(mapper));
    }

    /// Returns `true` when at least one mapper is registered.
    #[must_use]
    pub fn has_mapper(&self) -> bool {
        self.fallback.is_some() || !self.mappers.is_empty()
    }

    /// Resolves the identity of `model` and returns the updated model.
    ///
    /// Models without an identity pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LinkerError::NoMapper`] when no mapper serves the type,
    /// a conflict variant when the link would break the bijection, or
    /// [`LinkerError::Store`] when the mapper fails.
    pub fn link<M: DataModel>(&mut self, mut model: M, mode: LinkMode) -> Result<M, LinkerError> {
        let model_type = model.model_type();
        let Some(current) = model.identity().cloned() else {
            return Ok(model);
        };
        let resolved = match mode {
            LinkMode::Assign => self.assign(model_type, current)?,
            LinkMode::Resolve => self.resolve(model_type, current)?,
        };
        if let Some(identity) = model.identity_mut() {
            *identity = resolved;
        }
        Ok(model)
    }

    /// Removes the stored link of a delete-linked model.
    ///
    /// # Errors
    ///
    /// Returns [`LinkerError`] when no mapper serves the type or the mapper
    /// fails.
    pub fn unlink<M: DataModel>(&mut self, model: M) -> Result<M, LinkerError> {
        if let Some(identity) = model.identity() {
            self.remove(model.model_type(), identity)?;
        }
        Ok(model)
    }

    /// Removes the stored link of `identity`, keyed by its endpoint id when
    /// set and by its host id otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`LinkerError`] when no mapper serves the type or the mapper
    /// fails.
    pub fn remove(&mut self, model_type: ModelType, identity: &Identity) -> Result<(), LinkerError> {
        let store = |source| LinkerError::store(model_type, source);
        match (identity.endpoint(), identity.host()) {
            (Some(endpoint), _) => {
                debug!(target: IDENTITY_TARGET, %model_type, endpoint, "removing identity link");
                self.mapper_mut(model_type)?
                    .delete_by_endpoint(model_type, endpoint)
                    .map_err(store)?;
            }
            (None, Some(host)) => {
                debug!(target: IDENTITY_TARGET, %model_type, host, "removing identity link");
                self.mapper_mut(model_type)?
                    .delete_by_host(model_type, host)
                    .map_err(store)?;
            }
            (None, None) => {}
        }
        Ok(())
    }

    /// Stores a host-acknowledged identity, replacing a stale endpoint link.
    ///
    /// # Errors
    ///
    /// Returns [`LinkerError::HostConflict`] if the host id is already bound
    /// to a different endpoint id, or a store/mapper error.
    pub fn relink(&mut self, model_type: ModelType, identity: &Identity) -> Result<(), LinkerError> {
        let (Some(endpoint), Some(host)) = (identity.endpoint(), identity.host()) else {
            return Ok(());
        };
        let mapper = self.mapper_mut(model_type)?;
        let store = |source| LinkerError::store(model_type, source);
        match mapper.endpoint_id(model_type, host).map_err(store)? {
            Some(linked) if linked == endpoint => return Ok(()),
            Some(linked) => {
                return Err(LinkerError::HostConflict {
                    model_type,
                    host: host.to_owned(),
                    endpoint: endpoint.to_owned(),
                    linked_endpoint: linked,
                });
            }
            None => {}
        }
        mapper
            .delete_by_endpoint(model_type, endpoint)
            .map_err(store)?;
        mapper.save(model_type, endpoint, host).map_err(store)?;
        debug!(target: IDENTITY_TARGET, %model_type, endpoint, host, "identity acknowledged");
        Ok(())
    }

    /// Removes every stored link from every registered mapper.
    ///
    /// # Errors
    ///
    /// Returns the first mapper failure.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        for mapper in self.mappers.values_mut() {
            mapper.clear()?;
        }
        if let Some(mapper) = self.fallback.as_mut() {
            mapper.clear()?;
        }
        Ok(())
    }

    fn mapper_mut(
        &mut self,
        model_type: ModelType,
    ) -> Result<&mut (dyn PrimaryKeyMapper + 'static), LinkerError> {
        let mapper = if self.mappers.contains_key(&model_type) {
            self.mappers.get_mut(&model_type)
        } else {
            self.fallback.as_mut()
        };
        mapper
            .map(|mapper| mapper.as_mut())
            .ok_or(LinkerError::NoMapper { model_type })
    }

    fn assign(&mut self, model_type: ModelType, identity: Identity) -> Result<Identity, LinkerError> {
        let mapper = self.mapper_mut(model_type)?;
        let store = |source| LinkerError::store(model_type, source);
        match (identity.endpoint(), identity.host()) {
            (Some(endpoint), None) => {
                let host = match mapper.host_id(model_type, endpoint).map_err(store)? {
                    Some(linked) => linked,
                    None => {
                        let assigned = mapper.assign_host_id(model_type, endpoint).map_err(store)?;
                        debug!(target: IDENTITY_TARGET, %model_type, endpoint, host = %assigned, "host id assigned");
                        assigned
                    }
                };
                Ok(identity.with_host(host))
            }
            (None, Some(host)) => match mapper.endpoint_id(model_type, host).map_err(store)? {
                Some(endpoint) => Ok(identity.with_endpoint(endpoint)),
                None => Ok(identity),
            },
            (Some(endpoint), Some(host)) => {
                let linked_host = mapper.host_id(model_type, endpoint).map_err(store)?;
                let linked_endpoint = mapper.endpoint_id(model_type, host).map_err(store)?;
                if let Some(linked_host) = linked_host.as_deref().filter(|linked| *linked != host) {
                    return Err(LinkerError::EndpointConflict {
                        model_type,
                        endpoint: endpoint.to_owned(),
                        host: host.to_owned(),
                        linked_host: linked_host.to_owned(),
                    });
                }
                if let Some(linked_endpoint) =
                    linked_endpoint.as_deref().filter(|linked| *linked != endpoint)
                {
                    return Err(LinkerError::HostConflict {
                        model_type,
                        host: host.to_owned(),
                        endpoint: endpoint.to_owned(),
                        linked_endpoint: linked_endpoint.to_owned(),
                    });
                }
                if linked_host.is_none() && linked_endpoint.is_none() {
                    mapper.save(model_type, endpoint, host).map_err(store)?;
                    debug!(target: IDENTITY_TARGET, %model_type, endpoint, host, "identity linked");
                }
                Ok(identity)
            }
            (None, None) => Ok(identity),
        }
    }

    fn resolve(&mut self, model_type: ModelType, identity: Identity) -> Result<Identity, LinkerError> {
        let mapper = self.mapper_mut(model_type)?;
        let store = |source| LinkerError::store(model_type, source);
        match (identity.endpoint(), identity.host()) {
            (Some(endpoint), None) => Ok(match mapper.host_id(model_type, endpoint).map_err(store)? {
                Some(host) => identity.with_host(host),
                None => identity,
            }),
            (None, Some(host)) => Ok(match mapper.endpoint_id(model_type, host).map_err(store)? {
                Some(endpoint) => identity.with_endpoint(endpoint),
                None => identity,
            }),
            _ => Ok(identity),
        }
    }
}
