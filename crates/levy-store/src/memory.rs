//! # In-Memory Data Store
//!
//! A [`TaxStore`] that keeps everything in process memory. Used when no
//! database is available (development) and by the integration tests, which
//! need to seed payloads, inject failures and inspect what was persisted.
//!
//! All operations are synchronous behind a `parking_lot::Mutex`; the lock is
//! never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use levy_core::{
    default_target, CalculateTaxNotice, OrderReference, OrderType, PayloadRequest, RequestKind,
    RequestTarget, ServiceConfig, StoreError, TargetQuery, TaxStore,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

/// Buffered notices for the in-memory subscription.
const NOTICE_BUFFER: usize = 64;

/// A persisted calculation, as recorded by [`MemoryTaxStore::save_tax`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedTax {
    /// The order the tax was saved against.
    pub order: OrderReference,
    /// Raw response document.
    pub response: String,
    /// Total extracted from the response.
    pub total: Decimal,
}

type PayloadKey = (&'static str, Option<OrderType>, i64);

#[derive(Debug, Default)]
struct Inner {
    service: ServiceConfig,
    payloads: HashMap<PayloadKey, String>,
    payload_requests: Vec<PayloadRequest>,
    saved: Vec<SavedTax>,
    missing_targets: HashSet<RequestKind>,
    fail_payloads: Option<StoreError>,
    fail_saves: Option<StoreError>,
}

/// In-memory [`TaxStore`].
#[derive(Debug, Default)]
pub struct MemoryTaxStore {
    inner: Mutex<Inner>,
    notices: Mutex<Option<mpsc::Sender<CalculateTaxNotice>>>,
}

impl MemoryTaxStore {
    /// Create a store that serves `service` as its persisted configuration.
    pub fn new(service: ServiceConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                service,
                ..Inner::default()
            }),
            notices: Mutex::new(None),
        }
    }

    /// Seed the payload returned for a request. Keyed by request tag and
    /// order; the record flag and order number are not part of the key.
    pub fn set_payload(&self, request: &PayloadRequest, payload: impl Into<String>) {
        self.inner
            .lock()
            .payloads
            .insert(payload_key(request), payload.into());
    }

    /// Make target resolution for `kind` fail with "not found".
    pub fn remove_target(&self, kind: RequestKind) {
        self.inner.lock().missing_targets.insert(kind);
    }

    /// Make every payload resolution fail with `error` (or succeed again with `None`).
    pub fn fail_payloads(&self, error: Option<StoreError>) {
        self.inner.lock().fail_payloads = error;
    }

    /// Make every `save_tax` fail with `error` (or succeed again with `None`).
    pub fn fail_saves(&self, error: Option<StoreError>) {
        self.inner.lock().fail_saves = error;
    }

    /// Every calculation saved so far, oldest first.
    pub fn saved(&self) -> Vec<SavedTax> {
        self.inner.lock().saved.clone()
    }

    /// Every payload request served so far, oldest first.
    pub fn payload_requests(&self) -> Vec<PayloadRequest> {
        self.inner.lock().payload_requests.clone()
    }

    /// Deliver a `calculatetax` notice to the current subscriber.
    ///
    /// Returns `false` when nobody is subscribed or the buffer is full.
    pub fn notify(&self, notice: CalculateTaxNotice) -> bool {
        match self.notices.lock().as_ref() {
            Some(tx) => tx.try_send(notice).is_ok(),
            None => false,
        }
    }

    /// Close the notification channel, ending any listener loop.
    pub fn close_notifications(&self) {
        self.notices.lock().take();
    }
}

#[async_trait]
impl TaxStore for MemoryTaxStore {
    async fn load_service_config(&self) -> Result<ServiceConfig, StoreError> {
        Ok(self.inner.lock().service.clone())
    }

    async fn resolve_target(&self, query: TargetQuery<'_>) -> Result<RequestTarget, StoreError> {
        if self.inner.lock().missing_targets.contains(&query.kind) {
            return Err(StoreError::NotFound {
                what: format!("{} request target for {}", query.kind, query.order),
            });
        }
        default_target(&query)
    }

    async fn resolve_payload(&self, request: &PayloadRequest) -> Result<String, StoreError> {
        let mut inner = self.inner.lock();
        inner.payload_requests.push(request.clone());
        if let Some(err) = &inner.fail_payloads {
            return Err(err.clone());
        }
        Ok(inner
            .payloads
            .get(&payload_key(request))
            .cloned()
            .unwrap_or_else(|| default_payload(request)))
    }

    async fn save_tax(
        &self,
        order: &OrderReference,
        response: &str,
    ) -> Result<Decimal, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(err) = &inner.fail_saves {
            return Err(err.clone());
        }
        let total = total_tax(response)?;
        inner.saved.push(SavedTax {
            order: order.clone(),
            response: response.to_string(),
            total,
        });
        Ok(total)
    }

    async fn subscribe_calculate_tax(
        &self,
    ) -> Result<mpsc::Receiver<CalculateTaxNotice>, StoreError> {
        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        *self.notices.lock() = Some(tx);
        Ok(rx)
    }
}

fn payload_key(request: &PayloadRequest) -> PayloadKey {
    let order = request.order();
    (request.tag(), order.order_type, order.order_id)
}

/// Minimal document used when no payload was seeded.
fn default_payload(request: &PayloadRequest) -> String {
    let order = request.order();
    let mut doc = serde_json::json!({
        "code": order.transaction_code(),
        "request": request.tag(),
    });
    match request {
        PayloadRequest::Calculate { record, .. } => doc["commit"] = serde_json::json!(record),
        PayloadRequest::Refund { refund_date, .. } => {
            doc["refundDate"] = serde_json::json!(refund_date.to_string())
        }
        PayloadRequest::Post { .. } => doc["commit"] = serde_json::json!(true),
        PayloadRequest::Void { .. } => doc["code"] = serde_json::json!("DocVoided"),
    }
    doc.to_string()
}

/// Extract `totalTax` from a calculation response.
fn total_tax(response: &str) -> Result<Decimal, StoreError> {
    let decode_err = |reason: String| StoreError::Decode {
        what: "totalTax".into(),
        reason,
    };
    let doc: serde_json::Value =
        serde_json::from_str(response).map_err(|e| decode_err(e.to_string()))?;
    match doc.get("totalTax") {
        Some(serde_json::Value::Number(n)) => {
            Decimal::from_str(&n.to_string()).map_err(|e| decode_err(e.to_string()))
        }
        Some(serde_json::Value::String(s)) => {
            Decimal::from_str(s).map_err(|e| decode_err(e.to_string()))
        }
        Some(serde_json::Value::Null) | None => Ok(Decimal::ZERO),
        Some(other) => Err(decode_err(format!("unexpected value {other}"))),
    }
}
