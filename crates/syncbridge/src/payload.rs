//! Wire decoding and encoding of request and response packets.
//!
//! One packet occupies one line. Trailing whitespace, including the line
//! delimiter, is trimmed before parsing. Payloads that cannot be decoded are
//! answered with a parse-error envelope whose `id` is `null`, since the
//! originating request id is unknown.
//!
//! Batch elements are read one at a time. An element that is not a request
//! becomes its own `-32600` envelope, echoing its `id` when readable, and
//! its siblings are still dispatched.

use serde_json::{Value, json};
use syncbridge_core::error::codes;
use syncbridge_core::protocol::{Packet, RPC_VERSION, RequestId, RpcRequest, RpcResponse};
use thiserror::Error;
use tracing::debug;

const PAYLOAD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::payload");

/// Errors raised while decoding a request payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload was empty after trimming.
    #[error("empty request payload")]
    Empty,
    /// The payload exceeded the configured size limit.
    #[error("request payload of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected payload in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The payload was not a request or a batch of requests.
    #[error("malformed request payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl PayloadError {
    /// Builds the parse-error envelope answering a rejected payload.
    #[must_use]
    pub fn to_response(&self) -> Value {
        json!({
            "id": Value::Null,
            "jtlrpc": RPC_VERSION,
            "error": {
                "code": codes::PARSE_ERROR,
                "message": format!("Parse error: {self}"),
            },
        })
    }
}

/// One element of a decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A well-formed request, ready for dispatch.
    Request(RpcRequest),
    /// A batch element answered without dispatch.
    Invalid(RpcResponse),
}

/// Decodes one request payload.
///
/// # Errors
///
/// Returns [`PayloadError`] when the trimmed payload is empty, larger than
/// `limit` bytes, not JSON, or neither a request object nor an array.
pub fn decode(payload: &[u8], limit: usize) -> Result<Packet<Entry>, PayloadError> {
    let trimmed = trim_trailing_whitespace(payload);
    if trimmed.len() > limit {
        return Err(PayloadError::TooLarge {
            size: trimmed.len(),
            limit,
        });
    }
    if trimmed.is_empty() {
        return Err(PayloadError::Empty);
    }
    match serde_json::from_slice(trimmed).map_err(PayloadError::Malformed)? {
        Value::Array(elements) => Ok(Packet::Batch(elements.into_iter().map(read_entry).collect())),
        single => serde_json::from_value(single)
            .map(|request| Packet::Single(Entry::Request(request)))
            .map_err(PayloadError::Malformed),
    }
}

fn read_entry(element: Value) -> Entry {
    let id = element
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok())
        .unwrap_or(RequestId::Null);
    let jtlrpc = element
        .get("jtlrpc")
        .and_then(Value::as_str)
        .unwrap_or(RPC_VERSION)
        .to_owned();
    match serde_json::from_value(element) {
        Ok(request) => Entry::Request(request),
        Err(error) => {
            debug!(target: PAYLOAD_TARGET, %id, %error, "batch element is not a request");
            Entry::Invalid(RpcResponse::failure(
                id,
                jtlrpc,
                codes::INVALID_REQUEST,
                "Invalid Request",
            ))
        }
    }
}

/// Encodes a response packet as one newline-terminated line.
///
/// # Errors
///
/// Returns the serialiser error if a response result cannot be encoded.
pub fn encode(packet: &Packet<RpcResponse>) -> Result<Vec<u8>, serde_json::Error> {
    encode_value(packet)
}

/// Encodes any serialisable value as one newline-terminated line.
pub(crate) fn encode_value<T: serde::Serialize + ?Sized>(
    value: &T,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

fn trim_trailing_whitespace(payload: &[u8]) -> &[u8] {
    let end = payload
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |index| index + 1);
    payload.get(..end).unwrap_or_default()
}
