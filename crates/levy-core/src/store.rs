//! # Data Store Contract
//!
//! The tax integration does not own the ERP schema. Everything it needs from
//! the database goes through [`TaxStore`]: the persisted service settings,
//! the URL/header resolution for outbound requests, the business payloads for
//! the composite operations, persistence of calculated tax, and the
//! `calculatetax` notification channel.
//!
//! Implementations live in `levy-store` (Postgres and in-memory).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::config::{Credentials, ServiceConfig};
use crate::error::StoreError;
use crate::kind::RequestKind;
use crate::notice::CalculateTaxNotice;
use crate::order::OrderReference;

/// Parameters of a request-building query.
#[derive(Debug, Clone)]
pub struct TargetQuery<'a> {
    /// Request kind.
    pub kind: RequestKind,
    /// Order the request is about (may be [`OrderReference::none`]).
    pub order: &'a OrderReference,
    /// Credentials in effect for this request.
    pub credentials: &'a Credentials,
    /// Service API version, e.g. `v2`.
    pub api_version: &'a str,
}

/// The store's answer to a request-building query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTarget {
    /// Fully resolved request URL.
    pub url: Url,
    /// Extra headers to send with the request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Business payloads the composite operations need from order data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum PayloadRequest {
    /// Tax calculation document for an order.
    Calculate {
        /// The order.
        order: OrderReference,
        /// Record the transaction rather than only quoting it.
        record: bool,
    },
    /// Post (commit) document for a recorded order.
    Post {
        /// The order.
        order: OrderReference,
    },
    /// Void document for a recorded order.
    Void {
        /// The order.
        order: OrderReference,
    },
    /// Refund document for an invoice.
    Refund {
        /// Invoice header id.
        invoice_id: i64,
        /// Date the refund takes effect.
        refund_date: NaiveDate,
    },
}

impl PayloadRequest {
    /// Tag the data store keys payload resolution on.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Calculate { .. } => "calculate",
            Self::Post { .. } => "post",
            Self::Void { .. } => "void",
            Self::Refund { .. } => "refund",
        }
    }

    /// The order the payload is for. Refunds are always against an invoice.
    pub fn order(&self) -> OrderReference {
        match self {
            Self::Calculate { order, .. } | Self::Post { order } | Self::Void { order } => {
                order.clone()
            }
            Self::Refund { invoice_id, .. } => {
                OrderReference::new(crate::order::OrderType::invoice(), *invoice_id)
            }
        }
    }
}

/// Relational data store consumed by the tax integration.
///
/// Implementations must be `Send + Sync` so they can be shared behind an
/// `Arc`. The trait is object-safe.
#[async_trait]
pub trait TaxStore: Send + Sync {
    /// Load persisted service settings.
    async fn load_service_config(&self) -> Result<ServiceConfig, StoreError>;

    /// Resolve URL and extra headers for an outbound request.
    ///
    /// Returns [`StoreError::NotFound`] when the lookup yields no row.
    async fn resolve_target(&self, query: TargetQuery<'_>) -> Result<RequestTarget, StoreError>;

    /// Resolve the JSON payload for a composite operation.
    async fn resolve_payload(&self, request: &PayloadRequest) -> Result<String, StoreError>;

    /// Store a successful calculation response and return the tax total.
    async fn save_tax(&self, order: &OrderReference, response: &str)
        -> Result<Decimal, StoreError>;

    /// Subscribe to `calculatetax` notifications.
    async fn subscribe_calculate_tax(
        &self,
    ) -> Result<mpsc::Receiver<CalculateTaxNotice>, StoreError>;
}

/// Default URL resolution: base URL joined with the kind's path template.
///
/// Stores without a server-side template function use this directly.
pub fn default_target(query: &TargetQuery<'_>) -> Result<RequestTarget, StoreError> {
    let url = query
        .kind
        .url(
            &query.credentials.base_url,
            query.api_version,
            &query.credentials.company,
            query.order,
        )
        .map_err(|e| StoreError::Decode {
            what: format!("{} url", query.kind),
            reason: e.to_string(),
        })?;
    Ok(RequestTarget {
        url,
        headers: BTreeMap::new(),
    })
}
