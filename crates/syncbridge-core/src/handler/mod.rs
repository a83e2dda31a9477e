//! Handler contracts and the built-in connector core.
//!
//! Endpoint implementations register one [`EndpointHandler`] per controller.
//! Protocol-level methods in the `core` namespace are served by
//! [`CoreHandler`]s first; the built-in [`ConnectorCore`] covers
//! authentication, acknowledgement and mapping resets and lets every other
//! core action fall through to the endpoint.

use serde_json::Value;
use tracing::{debug, warn};

use crate::checksum::ChecksumLinker;
use crate::error::{HandlerError, codes};
use crate::identity::IdentityMap;
use crate::method::{Action, Method, controller_to_model_type};
use crate::model::{Ack, AuthRequest, BoxedModel, QueryFilter};
use crate::protocol::RpcErrorObject;

/// Tracing target for the connector core.
const CORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::core");

/// Controller the built-in [`ConnectorCore`] is registered under.
pub const CONNECTOR_CONTROLLER: &str = "connector";

/// Parameters handed to a handler.
#[derive(Debug)]
pub enum ActionParams {
    /// Decoded and linked entities of a push or delete.
    Models(Vec<BoxedModel>),
    /// Query filter of a pull or statistic.
    Filter(QueryFilter),
    /// Undecoded parameters of any other action.
    Raw(Value),
}

/// A request as seen by a handler.
#[derive(Debug)]
pub struct ActionRequest {
    /// Parsed method.
    pub method: Method,
    /// Parameters.
    pub params: ActionParams,
}

impl ActionRequest {
    /// Creates a request.
    #[must_use]
    pub const fn new(method: Method, params: ActionParams) -> Self {
        Self { method, params }
    }

    /// Returns the raw parameters, or `Null` for decoded ones.
    #[must_use]
    pub const fn raw_params(&self) -> &Value {
        match &self.params {
            ActionParams::Raw(value) => value,
            ActionParams::Models(_) | ActionParams::Filter(_) => &Value::Null,
        }
    }
}

/// Payload produced by a handler.
#[derive(Debug, Default)]
pub enum ActionOutput {
    /// A list of entities.
    Models(Vec<BoxedModel>),
    /// A single entity.
    Model(BoxedModel),
    /// A plain boolean, wrapped into a [`BoolResult`](crate::model::BoolResult).
    Bool(bool),
    /// An opaque value returned as-is.
    Value(Value),
    /// No payload.
    #[default]
    Empty,
}

/// Outcome of a handler invocation.
#[derive(Debug, Default)]
pub struct ActionResult {
    /// Produced payload; ignored when `error` is set.
    pub output: ActionOutput,
    /// Value-level error reported to the host.
    pub error: Option<RpcErrorObject>,
    /// Whether the handler took responsibility for the request.
    pub handled: bool,
}

impl ActionResult {
    /// Creates a handled result with a payload.
    #[must_use]
    pub fn handled(output: ActionOutput) -> Self {
        Self {
            output,
            error: None,
            handled: true,
        }
    }

    /// Creates a handled result carrying a value-level error.
    #[must_use]
    pub fn failed(error: RpcErrorObject) -> Self {
        Self {
            output: ActionOutput::Empty,
            error: Some(error),
            handled: true,
        }
    }

    /// Creates a result declining the request.
    #[must_use]
    pub fn unhandled() -> Self {
        Self::default()
    }
}

/// Handler serving one endpoint controller.
pub trait EndpointHandler: Send {
    /// Returns `true` if the handler implements `action`.
    fn can_handle(&self, action: Action) -> bool;

    /// Decodes push or delete parameters into entities.
    ///
    /// # Errors
    ///
    /// Returns the decoder error when the parameters do not match the
    /// controller's entity shape.
    fn decode_models(&self, params: Value) -> Result<Vec<BoxedModel>, serde_json::Error>;

    /// Handles a request.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the handler fails unexpectedly.
    fn handle(&mut self, request: ActionRequest) -> Result<ActionResult, HandlerError>;
}

/// The authentication mechanism.
pub trait TokenValidator: Send {
    /// Returns `true` if `token` grants access.
    fn validate(&self, token: &str) -> bool;
}

/// Validator accepting exactly one configured token.
#[derive(Clone)]
pub struct StaticTokenValidator {
    token: String,
}

impl StaticTokenValidator {
    /// Creates a validator for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenValidator")
            .field("token", &"***")
            .finish()
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> bool {
        !self.token.is_empty() && self.token == token
    }
}

/// Collaborators lent to a core handler for one request.
pub struct CoreContext<'a> {
    /// Identity map of the dispatcher.
    pub identities: &'a mut IdentityMap,
    /// Checksum linker of the dispatcher.
    pub checksums: &'a mut ChecksumLinker,
    /// Authentication mechanism of the dispatcher.
    pub tokens: &'a dyn TokenValidator,
}

/// Handler serving one controller of the `core` namespace.
pub trait CoreHandler: Send {
    /// Returns `true` if the handler implements `action`.
    fn can_handle(&self, action: Action) -> bool;

    /// Handles a request.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the handler fails unexpectedly.
    fn handle(
        &mut self,
        request: &ActionRequest,
        context: CoreContext<'_>,
    ) -> Result<ActionResult, HandlerError>;
}

/// Built-in handler for `core.connector.{auth,ack,clear}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectorCore;

impl ConnectorCore {
    fn auth(request: &ActionRequest, tokens: &dyn TokenValidator) -> ActionResult {
        let auth = match serde_json::from_value::<AuthRequest>(request.raw_params().clone()) {
            Ok(auth) => auth,
            Err(error) => {
                return ActionResult::failed(RpcErrorObject::new(
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {error}"),
                ));
            }
        };
        if tokens.validate(&auth.token) {
            debug!(target: CORE_TARGET, "host authenticated");
            ActionResult::handled(ActionOutput::Bool(true))
        } else {
            warn!(target: CORE_TARGET, "authentication rejected");
            ActionResult::failed(RpcErrorObject::new(
                codes::AUTHENTICATION_FAILED,
                "Could not authenticate access to the connector",
            ))
        }
    }

    fn ack(request: &ActionRequest, context: CoreContext<'_>) -> Result<ActionResult, HandlerError> {
        let ack: Ack = match serde_json::from_value(request.raw_params().clone()) {
            Ok(ack) => ack,
            Err(error) => {
                return Ok(ActionResult::failed(RpcErrorObject::new(
                    codes::INVALID_PARAMS,
                    format!("Invalid params: {error}"),
                )));
            }
        };

        for (controller, identities) in &ack.identities {
            let Ok(model_type) = controller_to_model_type(controller) else {
                warn!(target: CORE_TARGET, controller = %controller, "ack for unknown controller ignored");
                continue;
            };
            for identity in identities {
                context
                    .identities
                    .relink(model_type, identity)
                    .map_err(|error| HandlerError::with_source("failed to store acknowledged identity", error))?;
            }
        }

        let mut saved = 0_usize;
        for acked in &ack.checksums {
            let Ok(model_type) = controller_to_model_type(&acked.controller) else {
                warn!(target: CORE_TARGET, controller = %acked.controller, "checksum ack for unknown controller ignored");
                continue;
            };
            if context
                .checksums
                .save(model_type, &acked.checksum)
                .map_err(|error| HandlerError::with_source("failed to store acknowledged checksum", error))?
            {
                saved = saved.saturating_add(1);
            }
        }

        debug!(
            target: CORE_TARGET,
            controllers = ack.identities.len(),
            checksums = saved,
            "acknowledgement stored"
        );
        Ok(ActionResult::handled(ActionOutput::Bool(true)))
    }

    fn clear(context: CoreContext<'_>) -> Result<ActionResult, HandlerError> {
        context
            .identities
            .clear()
            .map_err(|error| HandlerError::with_source("failed to clear identity mappings", error))?;
        debug!(target: CORE_TARGET, "identity mappings cleared");
        Ok(ActionResult::handled(ActionOutput::Bool(true)))
    }
}

impl CoreHandler for ConnectorCore {
    fn can_handle(&self, action: Action) -> bool {
        matches!(action, Action::Auth | Action::Ack | Action::Clear)
    }

    fn handle(
        &mut self,
        request: &ActionRequest,
        context: CoreContext<'_>,
    ) -> Result<ActionResult, HandlerError> {
        match request.method.action() {
            Action::Auth => Ok(Self::auth(request, context.tokens)),
            Action::Ack => Self::ack(request, context),
            Action::Clear => Self::clear(context),
            _ => Ok(ActionResult::unhandled()),
        }
    }
}
