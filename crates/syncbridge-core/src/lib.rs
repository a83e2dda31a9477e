//! Request dispatch and reconciliation engine for the sync bridge.
//!
//! A host system drives synchronisation by sending packets of RPC requests
//! whose method names take the form `controller.action`, or
//! `core.controller.action` for built-in handlers. The [`Dispatcher`] routes
//! each request to a registered handler and reconciles the entities it
//! returns before the response envelope is assembled:
//!
//! 1. **Identity linking** pairs every endpoint-side primary key with a host
//!    id through a [`identity::PrimaryKeyMapper`], refusing conflicting pairs.
//! 2. **Checksum linking** compares host-supplied checksums with persisted
//!    values through a [`checksum::ChecksumLoader`] and flags the changed
//!    ones.
//!
//! Hook sinks observe every request, entity and filter around the handler
//! call. Every collaborator is registered explicitly through
//! [`DispatcherBuilder`]; a packet is refused with a [`ConfigurationError`]
//! when one is missing.

pub mod checksum;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod identity;
pub mod memory;
pub mod method;
pub mod model;
pub mod protocol;

pub use dispatch::{Dispatcher, DispatcherBuilder};
pub use error::{ConfigurationError, DispatchError};
pub use protocol::{Packet, RpcRequest, RpcResponse};

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod tests;
