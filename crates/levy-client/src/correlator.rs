//! # Response Correlation
//!
//! Matches a [`RawResponse`] to its in-flight entry, writes the audit record,
//! extracts the per-kind error, persists successful calculations and turns
//! the result into [`TaxEvent`]s.
//!
//! A response whose entry is gone (canceled or superseded) is discarded
//! before anything else happens: no audit record, no persistence, no event.

use levy_core::{RequestKind, TaxEvent, TaxResult, TaxStore};
use serde_json::Value;

use crate::audit::AuditLog;
use crate::transport::{RawResponse, TaxServiceTransport};

/// Error for a connection test whose credentials were rejected.
pub const INVALID_AUTHENTICATION: &str = "Invalid authentication details.";

/// What became of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The request was no longer in flight.
    Discarded,
    /// Events to publish, in order.
    Delivered(Vec<TaxEvent>),
}

/// Correlates completed exchanges against the transport's in-flight set.
#[derive(Clone, Copy)]
pub struct TaxResponseCorrelator<'a> {
    store: &'a dyn TaxStore,
    audit: Option<&'a AuditLog>,
}

impl<'a> TaxResponseCorrelator<'a> {
    /// Create a correlator persisting through `store`.
    pub fn new(store: &'a dyn TaxStore, audit: Option<&'a AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Correlate one response.
    pub async fn correlate(
        &self,
        transport: &mut TaxServiceTransport,
        raw: RawResponse,
    ) -> Outcome {
        let Some(pending) = transport.take(raw.id) else {
            tracing::debug!(request_id = %raw.id, "discarding response for canceled request");
            return Outcome::Discarded;
        };

        let elapsed = pending.dispatched_at.elapsed();
        tracing::info!(
            kind = pending.kind.tag(),
            order = %pending.order,
            request_id = %raw.id,
            status = raw.status,
            elapsed_ns = elapsed.as_nanos() as u64,
            "tax service response"
        );
        if let Some(audit) = self.audit {
            audit
                .append(pending.kind, elapsed, pending.body.as_deref(), &raw.body)
                .await;
        }

        let error = extract_error(pending.kind, &raw);
        let events = match pending.kind {
            RequestKind::Test => vec![TaxEvent::ConnectionTested { error }],
            RequestKind::ListTaxCodes => {
                let codes = parse_document(&raw.body);
                vec![TaxEvent::TaxCodesFetched { codes, error }]
            }
            RequestKind::ListExemptCodes => {
                let categories = parse_document(&raw.body);
                vec![TaxEvent::TaxExemptCategoriesFetched { categories, error }]
            }
            RequestKind::CreateOrAdjustTransaction if !error.is_empty() => {
                vec![TaxEvent::TaxCalculated {
                    order: pending.order,
                    result: TaxResult::failure(error),
                }]
            }
            RequestKind::CreateOrAdjustTransaction => {
                match self.store.save_tax(&pending.order, &raw.body).await {
                    Ok(amount) => vec![TaxEvent::TaxCalculated {
                        order: pending.order,
                        result: TaxResult::success(amount),
                    }],
                    Err(e) => {
                        tracing::error!(order = %pending.order, "failed to save tax: {e}");
                        vec![
                            TaxEvent::StoreFailure {
                                context: format!("saving tax for {}", pending.order),
                                message: e.to_string(),
                            },
                            TaxEvent::TaxCalculated {
                                order: pending.order,
                                result: TaxResult::default(),
                            },
                        ]
                    }
                }
            }
            RequestKind::CommitTransaction
            | RequestKind::VoidTransaction
            | RequestKind::RefundTransaction => vec![TaxEvent::TransactionFinished {
                kind: pending.kind,
                order: pending.order,
                error,
            }],
        };
        Outcome::Delivered(events)
    }
}

/// Per-kind error extraction. Empty means success.
pub fn extract_error(kind: RequestKind, raw: &RawResponse) -> String {
    match kind {
        RequestKind::Test => match &raw.transport_error {
            Some(e) => e.clone(),
            None => {
                let authenticated = serde_json::from_str::<Value>(&raw.body)
                    .ok()
                    .and_then(|doc| doc.get("authenticated").and_then(Value::as_bool))
                    .unwrap_or(false);
                if authenticated {
                    String::new()
                } else {
                    INVALID_AUTHENTICATION.to_string()
                }
            }
        },
        RequestKind::CreateOrAdjustTransaction => match &raw.transport_error {
            Some(e) => service_error(&raw.body).unwrap_or_else(|| e.clone()),
            None => String::new(),
        },
        RequestKind::ListTaxCodes
        | RequestKind::ListExemptCodes
        | RequestKind::CommitTransaction
        | RequestKind::VoidTransaction
        | RequestKind::RefundTransaction => raw.transport_error.clone().unwrap_or_default(),
    }
}

/// `"<code>: <message>"` plus the first detail description on its own line.
fn service_error(body: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(body).ok()?;
    let error = doc.get("error")?;
    let field = |name: &str| error.get(name).and_then(Value::as_str).unwrap_or_default();
    let mut text = format!("{}: {}", field("code"), field("message"));
    if let Some(description) = error
        .get("details")
        .and_then(Value::as_array)
        .and_then(|details| details.first())
        .and_then(|detail| detail.get("description"))
        .and_then(Value::as_str)
    {
        text.push('\n');
        text.push_str(description);
    }
    Some(text)
}

/// Catalogue document, or `Null` when the body is not JSON. The error is
/// the transport error alone.
fn parse_document(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        tracing::debug!("catalogue response is not JSON: {e}");
        Value::Null
    })
}
