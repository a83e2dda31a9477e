//! RPC method names and their resolution into controller/action pairs.
//!
//! Method names follow the `(core.)?controller.action` grammar. The
//! controller is a lower-case snake-case token naming an entity type (or a
//! protocol-level controller such as `connector` in the reserved `core`
//! namespace); the action is one of the closed set in [`Action`].

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::model::ModelType;

/// Namespace prefix reserved for protocol-level methods.
pub const CORE_NAMESPACE: &str = "core";

/// Closed set of supported actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    /// Fetch entities from the endpoint.
    Pull,
    /// Write entities to the endpoint.
    Push,
    /// Remove entities from the endpoint.
    Delete,
    /// Count entities awaiting a pull.
    Statistic,
    /// Authenticate the host.
    Auth,
    /// Acknowledge identities assigned by the host.
    Ack,
    /// Describe the endpoint.
    Identify,
    /// Signal the end of a sync run.
    Finish,
    /// Wipe identity mappings.
    Clear,
    /// Report supported features.
    Features,
}

impl Action {
    /// Returns the wire token of the action.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns `true` for actions whose parameters are a list of entities.
    #[must_use]
    pub const fn carries_models(self) -> bool {
        matches!(self, Self::Push | Self::Delete)
    }

    /// Returns `true` for actions whose parameters are a query filter.
    #[must_use]
    pub const fn carries_filter(self) -> bool {
        matches!(self, Self::Pull | Self::Statistic)
    }
}

/// A parsed method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    core: bool,
    controller: String,
    action: Action,
}

impl Method {
    /// Returns `true` when the method lives in the reserved `core` namespace.
    #[must_use]
    pub const fn is_core(&self) -> bool {
        self.core
    }

    /// Returns the controller token.
    #[must_use]
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Returns the action.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.action
    }

    /// Returns the entity type named by the controller.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::UnknownController`] if the controller does not
    /// name a known entity type.
    pub fn model_type(&self) -> Result<ModelType, MethodError> {
        controller_to_model_type(&self.controller)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.core {
            write!(f, "{CORE_NAMESPACE}.")?;
        }
        write!(f, "{}.{}", self.controller, self.action)
    }
}

impl FromStr for Method {
    type Err = MethodError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        split(name)
    }
}

/// Errors raised while resolving a method name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    /// The name does not match `(core.)?controller.action`.
    #[error("'{name}' is not a valid method name")]
    Malformed {
        /// Rejected method name.
        name: String,
    },
    /// The action is not part of the supported set.
    #[error("unsupported action '{action}' in method '{name}'")]
    UnsupportedAction {
        /// Rejected method name.
        name: String,
        /// Rejected action token.
        action: String,
    },
    /// The controller does not map to an entity type.
    #[error("unknown controller '{controller}'")]
    UnknownController {
        /// Rejected controller token.
        controller: String,
    },
}

/// Returns `true` iff `name` is a well-formed method with a supported action.
#[must_use]
pub fn is_method(name: &str) -> bool {
    split(name).is_ok()
}

/// Parses a method name into its controller and action.
///
/// # Errors
///
/// Returns [`MethodError::Malformed`] if the grammar does not match and
/// [`MethodError::UnsupportedAction`] if the action is outside the supported
/// set.
pub fn split(name: &str) -> Result<Method, MethodError> {
    let malformed = || MethodError::Malformed {
        name: name.to_owned(),
    };
    let parts: Vec<&str> = name.split('.').collect();
    let (core, controller, action) = match parts.as_slice() {
        [controller, action] => (false, *controller, *action),
        [CORE_NAMESPACE, controller, action] => (true, *controller, *action),
        _ => return Err(malformed()),
    };
    if !is_token(controller) || !is_token(action) {
        return Err(malformed());
    }
    let parsed = Action::from_str(action).map_err(|_| MethodError::UnsupportedAction {
        name: name.to_owned(),
        action: action.to_owned(),
    })?;
    Ok(Method {
        core,
        controller: controller.to_owned(),
        action: parsed,
    })
}

/// Maps a controller token to the entity type it names.
///
/// # Errors
///
/// Returns [`MethodError::UnknownController`] if no mapping exists.
pub fn controller_to_model_type(controller: &str) -> Result<ModelType, MethodError> {
    ModelType::from_str(controller).map_err(|_| MethodError::UnknownController {
        controller: controller.to_owned(),
    })
}

fn is_token(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next().is_some_and(|first| first.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
