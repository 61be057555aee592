//! # Order References
//!
//! Identifies the business document a tax request pertains to. Order-scoped
//! request kinds carry a full reference; order-independent kinds (connection
//! test, code listings) carry [`OrderReference::none()`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of an order type tag.
const ORDER_TYPE_MAX_LEN: usize = 16;

/// Order document type tag, e.g. `"SO"`, `"INV"`, `"CM"`.
///
/// Validated at construction: 1-16 ASCII alphanumeric characters. The tag is
/// kept verbatim because the data store keys on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderType(String);

impl OrderType {
    /// Validate and wrap an order type tag.
    pub fn new(tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into();
        if tag.is_empty()
            || tag.len() > ORDER_TYPE_MAX_LEN
            || !tag.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::InvalidOrderType(tag));
        }
        Ok(Self(tag))
    }

    /// Invoice order type, used for refunds.
    pub fn invoice() -> Self {
        Self("INV".to_string())
    }

    /// Access the tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OrderType> for String {
    fn from(value: OrderType) -> Self {
        value.0
    }
}

impl std::str::FromStr for OrderType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the order a tax request is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderReference {
    /// Order type tag; `None` for order-independent requests.
    pub order_type: Option<OrderType>,
    /// Order identifier; zero for order-independent requests.
    pub order_id: i64,
    /// Human-facing order number, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
}

impl OrderReference {
    /// Reference for requests that do not pertain to any order.
    pub fn none() -> Self {
        Self {
            order_type: None,
            order_id: 0,
            order_number: None,
        }
    }

    /// Reference to an order by type and id.
    pub fn new(order_type: OrderType, order_id: i64) -> Self {
        Self {
            order_type: Some(order_type),
            order_id,
            order_number: None,
        }
    }

    /// Attach the order number.
    pub fn with_number(mut self, order_number: impl Into<String>) -> Self {
        self.order_number = Some(order_number.into());
        self
    }

    /// True when this reference does not identify an order.
    pub fn is_none(&self) -> bool {
        self.order_type.is_none() && self.order_id == 0
    }

    /// Whether two references point at the same order.
    ///
    /// Compares type and id only. The order number is a display attribute
    /// and may be absent on one side.
    pub fn targets_same_order(&self, other: &OrderReference) -> bool {
        self.order_type == other.order_type && self.order_id == other.order_id
    }

    /// Transaction code under which the order is known to the tax service:
    /// `<type>-<number>`, falling back to the id when no number is known.
    pub fn transaction_code(&self) -> String {
        let order_type = self.order_type.as_ref().map(OrderType::as_str).unwrap_or("");
        match self.order_number.as_deref() {
            Some(number) if !number.is_empty() => format!("{order_type}-{number}"),
            _ => format!("{order_type}-{}", self.order_id),
        }
    }
}

impl std::fmt::Display for OrderReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.order_type {
            Some(t) => write!(f, "{t}#{}", self.order_id),
            None => f.write_str("(no order)"),
        }
    }
}
