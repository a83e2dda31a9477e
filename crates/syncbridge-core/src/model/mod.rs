//! Entity abstractions shared by the linkers, handlers and dispatcher.
//!
//! The data-model catalogue itself belongs to endpoint implementations. The
//! core only needs to know an entity's type, its [`Identity`], whether it
//! carries checksums, and how to project it for the wire; [`DataModel`]
//! captures exactly that. A handful of protocol-level value models live here
//! because the pipeline produces or consumes them itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{EnumString, IntoStaticStr};

use crate::checksum::{Checksum, ChecksumBearing};

/// Boxed model as passed through handlers and the dispatcher.
pub type BoxedModel = Box<dyn DataModel>;

/// Entity types known to the protocol.
///
/// Controllers name these in snake case (`customer_order`); a few legacy
/// aliases are accepted as irregular mappings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Canonical boolean result.
    BoolResult,
    /// Product category.
    Category,
    /// Connector-level protocol data.
    Connector,
    /// Cross-selling group.
    #[strum(to_string = "cross_selling", serialize = "crossselling")]
    CrossSelling,
    /// Customer account.
    Customer,
    /// Customer group.
    CustomerGroup,
    /// Customer order.
    #[strum(to_string = "customer_order", serialize = "order")]
    CustomerOrder,
    /// Delivery note.
    DeliveryNote,
    /// Global reference data (currencies, languages, tax rates).
    GlobalData,
    /// Product or category image.
    Image,
    /// Manufacturer.
    Manufacturer,
    /// Payment.
    Payment,
    /// Product.
    Product,
    /// Product price.
    ProductPrice,
    /// Product stock level.
    #[strum(to_string = "product_stock_level", serialize = "stock_level")]
    ProductStockLevel,
    /// Specific (filterable attribute).
    Specific,
    /// Per-controller statistic.
    Statistic,
}

impl ModelType {
    /// Returns the controller token naming this type.
    #[must_use]
    pub fn controller(self) -> &'static str {
        self.into()
    }

    /// Returns the strongly-typed entity name (`CustomerOrder`).
    #[must_use]
    pub fn type_name(self) -> String {
        format!("{self:?}")
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Paired host/endpoint ids for one logical entity.
///
/// Empty strings count as unset, so an identity decoded from a payload with
/// `""` on one side behaves exactly like one with `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, deserialize_with = "non_empty")]
    endpoint: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    host: Option<String>,
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|id| !id.is_empty()))
}

impl Identity {
    /// Creates an identity from both sides.
    pub fn new(endpoint: impl Into<String>, host: impl Into<String>) -> Self {
        Self::unlinked()
            .with_endpoint(endpoint)
            .with_host(host)
    }

    /// Creates an identity with neither side set.
    #[must_use]
    pub const fn unlinked() -> Self {
        Self {
            endpoint: None,
            host: None,
        }
    }

    /// Creates an identity known only to the endpoint.
    pub fn from_endpoint(endpoint: impl Into<String>) -> Self {
        Self::unlinked().with_endpoint(endpoint)
    }

    /// Creates an identity known only to the host.
    pub fn from_host(host: impl Into<String>) -> Self {
        Self::unlinked().with_host(host)
    }

    /// Returns this identity with the endpoint side replaced.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into()).filter(|id| !id.is_empty());
        self
    }

    /// Returns this identity with the host side replaced.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into()).filter(|id| !id.is_empty());
        self
    }

    /// Returns the endpoint id, if set.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns the host id, if set.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns `true` when neither side is set.
    #[must_use]
    pub fn is_unlinked(&self) -> bool {
        self.endpoint().is_none() && self.host().is_none()
    }
}

/// An entity the pipeline can reconcile.
///
/// Only [`model_type`](Self::model_type) and [`to_public`](Self::to_public)
/// are mandatory. Syncable entities expose their identity; entities with
/// change detection additionally opt into [`ChecksumBearing`].
pub trait DataModel: fmt::Debug + Send {
    /// Returns the entity type.
    fn model_type(&self) -> ModelType;

    /// Returns the entity's identity, if it is syncable.
    fn identity(&self) -> Option<&Identity> {
        None
    }

    /// Returns mutable access to the entity's identity, if it is syncable.
    fn identity_mut(&mut self) -> Option<&mut Identity> {
        None
    }

    /// Returns the checksum capability, if the entity carries checksums.
    fn checksums(&self) -> Option<&dyn ChecksumBearing> {
        None
    }

    /// Returns mutable access to the checksum capability.
    fn checksums_mut(&mut self) -> Option<&mut dyn ChecksumBearing> {
        None
    }

    /// Projects the entity into its externally serialisable form.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity cannot be serialised.
    fn to_public(&self) -> Result<Value, serde_json::Error>;
}

impl<T: DataModel + ?Sized> DataModel for Box<T> {
    fn model_type(&self) -> ModelType {
        (**self).model_type()
    }

    fn identity(&self) -> Option<&Identity> {
        (**self).identity()
    }

    fn identity_mut(&mut self) -> Option<&mut Identity> {
        (**self).identity_mut()
    }

    fn checksums(&self) -> Option<&dyn ChecksumBearing> {
        (**self).checksums()
    }

    fn checksums_mut(&mut self) -> Option<&mut dyn ChecksumBearing> {
        (**self).checksums_mut()
    }

    fn to_public(&self) -> Result<Value, serde_json::Error> {
        (**self).to_public()
    }
}

/// Decodes push/delete parameters into boxed models of type `M`.
///
/// Accepts either a JSON array of entities or a single entity object.
/// `null` decodes to an empty list.
///
/// # Errors
///
/// Returns the decoder error if the parameters do not match `M`.
pub fn decode_models<M>(params: Value) -> Result<Vec<BoxedModel>, serde_json::Error>
where
    M: DataModel + DeserializeOwned + 'static,
{
    let models: Vec<M> = match params {
        Value::Null => Vec::new(),
        Value::Array(_) => serde_json::from_value(params)?,
        single => vec![serde_json::from_value(single)?],
    };
    Ok(models
        .into_iter()
        .map(|model| Box::new(model) as BoxedModel)
        .collect())
}

/// Canonical entity wrapping a boolean handler result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolResult {
    /// The wrapped result.
    pub result: bool,
}

impl BoolResult {
    /// Wraps a boolean result.
    #[must_use]
    pub const fn new(result: bool) -> Self {
        Self { result }
    }
}

impl DataModel for BoolResult {
    fn model_type(&self) -> ModelType {
        ModelType::BoolResult
    }

    fn to_public(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Parameters of pull and statistic requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    /// Maximum number of entities to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Free-form endpoint-specific filters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, Value>,
}

impl QueryFilter {
    /// Creates a filter with a limit.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Decodes the filter from request parameters; `null` yields the default.
    ///
    /// # Errors
    ///
    /// Returns the decoder error if the parameters are not a filter object.
    pub fn from_params(params: Value) -> Result<Self, serde_json::Error> {
        if params.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(params)
    }
}

/// Count of entities awaiting a pull for one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    /// Controller the count belongs to.
    pub controller_name: String,
    /// Number of entities available for pulling.
    pub available: u64,
}

impl DataModel for Statistic {
    fn model_type(&self) -> ModelType {
        ModelType::Statistic
    }

    fn to_public(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Identities and checksums acknowledged by the host after a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Acknowledged identities grouped by controller token.
    #[serde(default)]
    pub identities: BTreeMap<String, Vec<Identity>>,
    /// Acknowledged checksums.
    #[serde(default)]
    pub checksums: Vec<AckChecksum>,
}

/// A checksum acknowledged by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckChecksum {
    /// Controller token of the owning entity.
    pub controller: String,
    /// The acknowledged checksum.
    #[serde(flatten)]
    pub checksum: Checksum,
}

/// Parameters of `core.connector.auth`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthRequest {
    /// Token presented by the host.
    pub token: String,
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("token", &"***")
            .finish()
    }
}
