//! # Results and Notifications
//!
//! [`TaxResult`] is what a tax calculation produces; [`TaxEvent`] is the
//! notification surface consumed by order-entry code. Both are transient:
//! built per response, published, and not retained.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::kind::RequestKind;
use crate::order::OrderReference;

/// Outcome of a tax calculation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxResult {
    /// Calculated tax total. `None` when nothing was calculated, including
    /// when the service succeeded but storing the result failed.
    pub amount: Option<Decimal>,
    /// Human-readable error; empty means success.
    pub error: String,
}

impl TaxResult {
    /// Successful calculation.
    pub fn success(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            error: String::new(),
        }
    }

    /// Failed calculation.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            amount: None,
            error: error.into(),
        }
    }

    /// True when `error` is empty.
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Notification published by a tax service integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaxEvent {
    /// A connection test finished.
    ConnectionTested {
        /// Empty on success.
        error: String,
    },
    /// The tax code catalogue arrived.
    TaxCodesFetched {
        /// Response document as returned by the service.
        codes: serde_json::Value,
        /// Empty on success.
        error: String,
    },
    /// The exemption category catalogue arrived.
    TaxExemptCategoriesFetched {
        /// Response document as returned by the service.
        categories: serde_json::Value,
        /// Empty on success.
        error: String,
    },
    /// Tax was calculated for an order.
    TaxCalculated {
        /// The order the calculation was for.
        order: OrderReference,
        /// Amount and error.
        result: TaxResult,
    },
    /// A commit, void or refund finished.
    TransactionFinished {
        /// Which commit-class operation.
        kind: RequestKind,
        /// The order it applied to.
        order: OrderReference,
        /// Empty on success.
        error: String,
    },
    /// A data-access failure while preparing or storing a request.
    StoreFailure {
        /// What was being attempted.
        context: String,
        /// Failure description.
        message: String,
    },
}

impl TaxEvent {
    /// Error string carried by the event, empty on success.
    pub fn error(&self) -> &str {
        match self {
            Self::ConnectionTested { error }
            | Self::TaxCodesFetched { error, .. }
            | Self::TaxExemptCategoriesFetched { error, .. }
            | Self::TransactionFinished { error, .. } => error,
            Self::TaxCalculated { result, .. } => &result.error,
            Self::StoreFailure { message, .. } => message,
        }
    }
}
