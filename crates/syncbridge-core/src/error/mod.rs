//! Error taxonomy for the dispatch pipeline.
//!
//! Errors fall into two families. [`ConfigurationError`] is fatal: it is
//! raised once per packet before any request runs and aborts the whole call.
//! Everything else is scoped to a single request and ends up as a JSON-RPC
//! error object inside that request's response envelope via
//! [`DispatchError::code`].

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::method::MethodError;
use crate::model::ModelType;

/// Numeric JSON-RPC error codes used on the wire.
pub mod codes {
    /// The payload could not be parsed as JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// The request envelope or method name is malformed.
    pub const INVALID_REQUEST: i32 = -32600;
    /// No handler exists for the method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The parameters could not be decoded into the expected shape.
    pub const INVALID_PARAMS: i32 = -32602;
    /// A handler or collaborator failed unexpectedly.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// A handler exists but declined to handle the request.
    pub const UNHANDLED: i32 = -32000;
    /// The supplied authentication token was rejected.
    pub const AUTHENTICATION_FAILED: i32 = -32001;
}

/// Failure reported by a storage collaborator (mapper or checksum loader).
///
/// The message is kept alongside an optional shared source so the error can
/// be cloned into several diagnostics without losing the cause.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
    #[source]
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl StoreError {
    /// Creates a store error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a store error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while linking identities.
#[derive(Debug, Clone, Error)]
pub enum LinkerError {
    /// No primary-key mapper serves the model type.
    #[error("no primary key mapper registered for {model_type}")]
    NoMapper {
        /// Model type that had no mapper.
        model_type: ModelType,
    },
    /// The endpoint id is already linked to another host id.
    #[error(
        "endpoint id '{endpoint}' of {model_type} is linked to host id '{linked_host}', not '{host}'"
    )]
    EndpointConflict {
        /// Model type of the conflicting link.
        model_type: ModelType,
        /// Endpoint id carried by the entity.
        endpoint: String,
        /// Host id carried by the entity.
        host: String,
        /// Host id already stored for the endpoint id.
        linked_host: String,
    },
    /// The host id is already linked to another endpoint id.
    #[error(
        "host id '{host}' of {model_type} is linked to endpoint id '{linked_endpoint}', not '{endpoint}'"
    )]
    HostConflict {
        /// Model type of the conflicting link.
        model_type: ModelType,
        /// Host id carried by the entity.
        host: String,
        /// Endpoint id carried by the entity.
        endpoint: String,
        /// Endpoint id already stored for the host id.
        linked_endpoint: String,
    },
    /// The mapper failed to read or write a link.
    #[error("primary key mapper failed for {model_type}: {source}")]
    Store {
        /// Model type being linked.
        model_type: ModelType,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
}

impl LinkerError {
    /// Wraps a store failure with the model type being linked.
    pub const fn store(model_type: ModelType, source: StoreError) -> Self {
        Self::Store { model_type, source }
    }
}

/// Backing store failure while reading or writing checksums.
#[derive(Debug, Clone, Error)]
#[error("checksum store failed to {operation} {model_type} '{endpoint_id}': {source}")]
pub struct ChecksumStoreError {
    /// Operation that failed (`read`, `write` or `delete`).
    pub operation: &'static str,
    /// Model type owning the checksum.
    pub model_type: ModelType,
    /// Endpoint id the checksum is keyed by.
    pub endpoint_id: String,
    /// Underlying store failure.
    #[source]
    pub source: StoreError,
}

/// Failure returned by an endpoint or core handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Creates a handler error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a handler error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Failure reported by a hook sink. Always logged, never propagated.
#[derive(Debug, Error)]
#[error("hook '{sink}' failed: {message}")]
pub struct HookError {
    /// Name of the failing sink.
    pub sink: String,
    /// Description of the failure.
    pub message: String,
}

impl HookError {
    /// Creates a hook error for the named sink.
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

/// Fatal conditions that abort a packet before any request executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No endpoint handler was registered.
    #[error("no endpoint handler registered")]
    NoEndpointHandler,
    /// No primary-key mapper was registered.
    #[error("no primary key mapper registered")]
    NoPrimaryKeyMapper,
    /// No checksum loader was registered.
    #[error("no checksum loader registered")]
    NoChecksumLoader,
    /// No token validator was registered.
    #[error("no authentication mechanism registered")]
    NoAuthentication,
    /// A request announced a protocol version this implementation does not speak.
    #[error("protocol version mismatch: expected '{expected}', got '{found}'")]
    VersionMismatch {
        /// Version this implementation speaks.
        expected: String,
        /// Version carried by the request.
        found: String,
    },
}

/// Per-request failures, each mapped to a JSON-RPC error code.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The method name is malformed or names an unsupported action.
    #[error("Invalid Request")]
    Protocol {
        /// Parse failure behind the rejection.
        #[source]
        source: MethodError,
    },
    /// No handler exists for the method.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// Method that was requested.
        method: String,
    },
    /// A handler exists for the method but declined to handle it.
    #[error("Method could not be handled")]
    Unhandled {
        /// Method that was requested.
        method: String,
    },
    /// The parameters do not match the shape expected by the action.
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Decoder message.
        message: String,
    },
    /// A handler failed unexpectedly.
    #[error("Internal error: {source}")]
    Internal {
        /// Handler failure.
        #[source]
        source: HandlerError,
    },
    /// Identity linking failed.
    #[error("Identity linking failed: {0}")]
    Linker(#[from] LinkerError),
    /// The checksum store failed.
    #[error("Checksum store failed: {0}")]
    ChecksumStore(#[from] ChecksumStoreError),
    /// The response payload could not be serialised.
    #[error("Internal error: failed to serialise result: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DispatchError {
    /// Returns the JSON-RPC code reported to the host for this error.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Protocol { .. } => codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::Unhandled { .. } => codes::UNHANDLED,
            Self::InvalidParams { .. } => codes::INVALID_PARAMS,
            Self::Internal { .. }
            | Self::Linker(_)
            | Self::ChecksumStore(_)
            | Self::Serialize(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Creates a protocol error from a method parse failure.
    pub const fn protocol(source: MethodError) -> Self {
        Self::Protocol { source }
    }

    /// Creates a method-not-found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Creates an unhandled-method error.
    pub fn unhandled(method: impl Into<String>) -> Self {
        Self::Unhandled {
            method: method.into(),
        }
    }

    /// Creates an invalid-params error from a decoder failure.
    pub fn invalid_params(source: &serde_json::Error) -> Self {
        Self::InvalidParams {
            message: source.to_string(),
        }
    }

    /// Creates an internal error from a handler failure.
    pub const fn internal(source: HandlerError) -> Self {
        Self::Internal { source }
    }
}

#[cfg(test)]
mod tests;
