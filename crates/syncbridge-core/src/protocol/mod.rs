//! Wire envelopes for requests and responses.
//!
//! A request is `{id, jtlrpc, method, params}`; a response echoes `id` and
//! `jtlrpc` and carries exactly one of `result` or `error`. Several envelopes
//! travel together as a JSON array (batch), a lone envelope as a bare object
//! (single).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope version string every request must carry.
pub const RPC_VERSION: &str = "2.0";

/// Connector protocol version reported by `connector.identify`.
pub const PROTOCOL_VERSION: u32 = 7;

/// Request identifier, echoed verbatim in the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric identifier.
    Number(i64),
    /// String identifier.
    Text(String),
    /// `null`, also used when an unreadable request is answered.
    Null,
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Null => f.write_str("null"),
        }
    }
}

/// An incoming RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id.
    pub id: RequestId,
    /// Envelope version; must equal [`RPC_VERSION`].
    pub jtlrpc: String,
    /// Method name, `(core.)?controller.action`.
    pub method: String,
    /// Raw parameters.
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Creates a request with the current envelope version.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            jtlrpc: RPC_VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl RpcErrorObject {
    /// Creates an error object.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Either the result or the error of a response, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    /// Successful result payload.
    Result(Value),
    /// Failure description.
    Error(RpcErrorObject),
}

/// An outgoing RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Id of the originating request.
    pub id: RequestId,
    /// Envelope version of the originating request.
    pub jtlrpc: String,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl RpcResponse {
    /// Builds a successful response.
    pub fn success(id: RequestId, jtlrpc: impl Into<String>, result: Value) -> Self {
        Self {
            id,
            jtlrpc: jtlrpc.into(),
            outcome: ResponseOutcome::Result(result),
        }
    }

    /// Builds a failed response.
    pub fn failure(
        id: RequestId,
        jtlrpc: impl Into<String>,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            jtlrpc: jtlrpc.into(),
            outcome: ResponseOutcome::Error(RpcErrorObject::new(code, message)),
        }
    }

    /// Returns the result payload, if the response succeeded.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(value) => Some(value),
            ResponseOutcome::Error(_) => None,
        }
    }

    /// Returns the error object, if the response failed.
    #[must_use]
    pub const fn error(&self) -> Option<&RpcErrorObject> {
        match &self.outcome {
            ResponseOutcome::Result(_) => None,
            ResponseOutcome::Error(error) => Some(error),
        }
    }
}

/// One envelope or a batch of envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Packet<T> {
    /// A JSON array of envelopes.
    Batch(Vec<T>),
    /// A bare envelope object.
    Single(T),
}

impl<T> Packet<T> {
    /// Returns the envelopes in order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Batch(items) => items,
            Self::Single(item) => std::slice::from_ref(item),
        }
    }

    /// Returns the number of envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns `true` when the packet was a JSON array.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Consumes the packet, returning its envelopes in order.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Batch(items) => items,
            Self::Single(item) => vec![item],
        }
    }
}
