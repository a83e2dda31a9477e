//! Request dispatch and reconciliation.
//!
//! The [`Dispatcher`] owns every collaborator explicitly. Each packet first
//! passes a preflight that proves all collaborators are present; only then
//! are its requests executed, in order, each isolated from its siblings.
//! Per request the pipeline validates the method, notifies hooks, routes to a
//! core or endpoint handler, reconciles identities and checksums of the
//! returned entities and assembles the response envelope.
//!
//! Deleted entities are never checksum-linked. Once a delete is handled
//! without error, the checksum rows and identity links of every incoming
//! entity are removed, whatever the handler answered with.

mod builder;
mod masking;

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

pub use self::builder::DispatcherBuilder;
use self::masking::mask_secrets;
use crate::checksum::{ChecksumLinker, ChecksumType};
use crate::error::{ConfigurationError, DispatchError};
use crate::handler::{
    ActionOutput, ActionParams, ActionRequest, ActionResult, CoreContext, CoreHandler,
    EndpointHandler, TokenValidator,
};
use crate::hooks::{HookEvent, HookPhase, HookSubject, Hooks};
use crate::identity::{IdentityMap, LinkMode};
use crate::method::{Action, Method, split};
use crate::model::{BoolResult, BoxedModel, DataModel, Identity, ModelType, QueryFilter};
use crate::protocol::{
    Packet, RPC_VERSION, ResponseOutcome, RpcErrorObject, RpcRequest, RpcResponse,
};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes packets of requests to handlers and reconciles their results.
pub struct Dispatcher {
    endpoints: HashMap<String, Box<dyn EndpointHandler>>,
    cores: HashMap<String, Box<dyn CoreHandler>>,
    identities: IdentityMap,
    checksums: Option<ChecksumLinker>,
    tokens: Option<Box<dyn TokenValidator>>,
    hooks: Hooks,
    developer_logging: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("cores", &self.cores.keys().collect::<Vec<_>>())
            .field("identities", &self.identities)
            .field("checksums", &self.checksums.is_some())
            .field("tokens", &self.tokens.is_some())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Dispatcher {
    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Executes every request of a packet and returns the matching responses.
    ///
    /// A batch yields one response per request, in request order. A single
    /// request yields a single response.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] before any request runs when a
    /// collaborator is missing or a request announces a foreign envelope
    /// version.
    pub fn dispatch(
        &mut self,
        packet: Packet<RpcRequest>,
    ) -> Result<Packet<RpcResponse>, ConfigurationError> {
        let mut pipeline = self.preflight(packet.as_slice())?;
        debug!(
            target: DISPATCH_TARGET,
            requests = packet.len(),
            batch = packet.is_batch(),
            "dispatching packet"
        );
        Ok(match packet {
            Packet::Single(request) => Packet::Single(pipeline.execute(request)),
            Packet::Batch(requests) => Packet::Batch(
                requests
                    .into_iter()
                    .map(|request| pipeline.execute(request))
                    .collect(),
            ),
        })
    }

    fn preflight(&mut self, requests: &[RpcRequest]) -> Result<Pipeline<'_>, ConfigurationError> {
        let Self {
            endpoints,
            cores,
            identities,
            checksums,
            tokens,
            hooks,
            developer_logging,
        } = self;
        if endpoints.is_empty() {
            return Err(ConfigurationError::NoEndpointHandler);
        }
        if !identities.has_mapper() {
            return Err(ConfigurationError::NoPrimaryKeyMapper);
        }
        let checksum_linker = checksums
            .as_mut()
            .ok_or(ConfigurationError::NoChecksumLoader)?;
        let token_validator = tokens
            .as_deref()
            .ok_or(ConfigurationError::NoAuthentication)?;
        if let Some(request) = requests.iter().find(|request| request.jtlrpc != RPC_VERSION) {
            return Err(ConfigurationError::VersionMismatch {
                expected: RPC_VERSION.to_owned(),
                found: request.jtlrpc.clone(),
            });
        }
        Ok(Pipeline {
            endpoints,
            cores,
            identities,
            checksums: checksum_linker,
            tokens: token_validator,
            hooks,
            developer_logging: *developer_logging,
        })
    }
}

/// Collaborators proven present by the preflight, borrowed for one packet.
struct Pipeline<'a> {
    endpoints: &'a mut HashMap<String, Box<dyn EndpointHandler>>,
    cores: &'a mut HashMap<String, Box<dyn CoreHandler>>,
    identities: &'a mut IdentityMap,
    checksums: &'a mut ChecksumLinker,
    tokens: &'a dyn TokenValidator,
    hooks: &'a mut Hooks,
    developer_logging: bool,
}

impl Pipeline<'_> {
    fn execute(&mut self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            id,
            jtlrpc,
            method,
            params,
        } = request;
        if self.developer_logging {
            debug!(
                target: DISPATCH_TARGET,
                %id,
                method = %method,
                params = %mask_secrets(&params),
                "request received"
            );
        }

        let parsed = match split(&method) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %id, method = %method, %error, "invalid method");
                let failure = DispatchError::protocol(error);
                return RpcResponse::failure(id, jtlrpc, failure.code(), failure.to_string());
            }
        };

        let outcome = match self.run(&parsed, params) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    %id,
                    method = %method,
                    code = error.code(),
                    %error,
                    "request failed"
                );
                ResponseOutcome::Error(RpcErrorObject::new(error.code(), error.to_string()))
            }
        };
        let response = RpcResponse {
            id,
            jtlrpc,
            outcome,
        };

        match serde_json::to_value(&response) {
            Ok(envelope) => self.hooks.emit(&HookEvent {
                controller: parsed.controller(),
                action: parsed.action(),
                phase: HookPhase::After,
                subject: HookSubject::Rpc(&envelope),
            }),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "response not observable by hooks");
            }
        }
        response
    }

    fn run(&mut self, method: &Method, params: Value) -> Result<ResponseOutcome, DispatchError> {
        let controller = method.controller();
        let action = method.action();
        debug!(target: DISPATCH_TARGET, %method, "routing request");
        self.hooks.emit(&HookEvent {
            controller,
            action,
            phase: HookPhase::Before,
            subject: HookSubject::Rpc(&params),
        });

        if method.is_core() {
            if let Some(result) = self.run_core(method, &params)? {
                debug!(target: DISPATCH_TARGET, %method, "handled by core");
                return self.respond(method, result, false);
            }
        }

        let Some(handler) = self
            .endpoints
            .get_mut(controller)
            .filter(|handler| handler.can_handle(action))
        else {
            return Err(DispatchError::method_not_found(method.to_string()));
        };

        let mut released = Vec::new();
        let action_params = if action.carries_models() {
            let models = handler
                .decode_models(params)
                .map_err(|error| DispatchError::invalid_params(&error))?;
            let mut linked = Vec::with_capacity(models.len());
            for model in models {
                let identified = self.identities.link(model, link_mode(action))?;
                let reconciled = if action == Action::Delete {
                    released.push(Released::of(&*identified));
                    identified
                } else {
                    self.checksums.link(identified, None)?
                };
                self.hooks.emit(&HookEvent {
                    controller,
                    action,
                    phase: HookPhase::Before,
                    subject: HookSubject::Model(&*reconciled),
                });
                linked.push(reconciled);
            }
            ActionParams::Models(linked)
        } else if action.carries_filter() {
            let filter =
                QueryFilter::from_params(params).map_err(|error| DispatchError::invalid_params(&error))?;
            self.hooks.emit(&HookEvent {
                controller,
                action,
                phase: HookPhase::Before,
                subject: HookSubject::Filter(&filter),
            });
            ActionParams::Filter(filter)
        } else {
            ActionParams::Raw(params)
        };

        let result = handler
            .handle(ActionRequest::new(method.clone(), action_params))
            .map_err(DispatchError::internal)?;
        if !result.handled {
            return Err(DispatchError::unhandled(method.to_string()));
        }
        let succeeded = result.error.is_none();
        let outcome = self.respond(method, result, true)?;
        if succeeded {
            self.release(&released)?;
        }
        Ok(outcome)
    }

    fn release(&mut self, released: &[Released]) -> Result<(), DispatchError> {
        for entity in released {
            let Some(identity) = &entity.identity else {
                continue;
            };
            if let Some(endpoint_id) = identity.endpoint() {
                self.checksums
                    .remove(entity.model_type, endpoint_id, &entity.checksum_types)?;
            }
            self.identities.remove(entity.model_type, identity)?;
        }
        Ok(())
    }

    fn run_core(
        &mut self,
        method: &Method,
        params: &Value,
    ) -> Result<Option<ActionResult>, DispatchError> {
        let Some(core) = self
            .cores
            .get_mut(method.controller())
            .filter(|core| core.can_handle(method.action()))
        else {
            return Ok(None);
        };
        let request = ActionRequest::new(method.clone(), ActionParams::Raw(params.clone()));
        let context = CoreContext {
            identities: &mut *self.identities,
            checksums: &mut *self.checksums,
            tokens: self.tokens,
        };
        let result = core.handle(&request, context).map_err(DispatchError::internal)?;
        Ok(result.handled.then_some(result))
    }

    fn respond(
        &mut self,
        method: &Method,
        result: ActionResult,
        reconcile: bool,
    ) -> Result<ResponseOutcome, DispatchError> {
        if let Some(error) = result.error {
            debug!(target: DISPATCH_TARGET, %method, code = error.code, "handler reported an error");
            return Ok(ResponseOutcome::Error(error));
        }
        let value = match result.output {
            ActionOutput::Models(models) => {
                let mut projected = Vec::with_capacity(models.len());
                for model in models {
                    projected.push(self.finish_model(method, model, reconcile)?);
                }
                Value::Array(projected)
            }
            ActionOutput::Model(model) => self.finish_model(method, model, reconcile)?,
            ActionOutput::Bool(result) => {
                self.finish_model(method, Box::new(BoolResult::new(result)), reconcile)?
            }
            ActionOutput::Value(value) => value,
            ActionOutput::Empty => Value::Null,
        };
        Ok(ResponseOutcome::Result(value))
    }

    fn finish_model(
        &mut self,
        method: &Method,
        model: BoxedModel,
        reconcile: bool,
    ) -> Result<Value, DispatchError> {
        let action = method.action();
        let linked = if reconcile {
            let identified = self.identities.link(model, link_mode(action))?;
            if action == Action::Delete {
                identified
            } else {
                self.checksums.link(identified, None)?
            }
        } else {
            model
        };
        self.hooks.emit(&HookEvent {
            controller: method.controller(),
            action,
            phase: HookPhase::After,
            subject: HookSubject::Model(&*linked),
        });
        let finished = if reconcile && action == Action::Delete {
            let released = self.checksums.unlink(linked)?;
            self.identities.unlink(released)?
        } else {
            linked
        };
        Ok(finished.to_public()?)
    }
}

/// State a handled delete removes for one incoming entity.
struct Released {
    model_type: ModelType,
    identity: Option<Identity>,
    checksum_types: Vec<ChecksumType>,
}

impl Released {
    fn of(model: &dyn DataModel) -> Self {
        Self {
            model_type: model.model_type(),
            identity: model.identity().cloned(),
            checksum_types: model
                .checksums()
                .map(|bearing| {
                    bearing
                        .checksum_records()
                        .iter()
                        .map(|checksum| checksum.checksum_type)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

const fn link_mode(action: Action) -> LinkMode {
    LinkMode::for_delete(matches!(action, Action::Delete))
}

#[cfg(test)]
mod tests;
