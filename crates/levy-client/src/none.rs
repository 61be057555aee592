//! Null integration for installations without a tax service.
//!
//! Every operation succeeds immediately: zero tax, empty catalogues. Events
//! are still published so callers need not care which integration they got.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use levy_core::{
    CalculateTaxNotice, Credentials, OrderReference, OrderType, RequestKind, StoreError,
    TaxEvent, TaxResult, TaxStore,
};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};

use crate::service::{TaxService, EVENT_CAPACITY};

/// [`TaxService`] that never leaves the process.
#[derive(Debug)]
pub struct NoIntegration {
    events: broadcast::Sender<TaxEvent>,
    notices: Option<mpsc::Receiver<CalculateTaxNotice>>,
}

impl NoIntegration {
    /// Create a null integration.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            notices: None,
        }
    }

    /// Subscribe to `calculatetax` notices so they are answered with zero tax.
    pub async fn listen<S: TaxStore + ?Sized>(&mut self, store: Arc<S>) -> Result<(), StoreError> {
        self.notices = Some(store.subscribe_calculate_tax().await?);
        Ok(())
    }

    fn publish(&self, event: TaxEvent) {
        let _ = self.events.send(event);
    }

    fn zero_tax(&self, order: OrderReference) {
        self.publish(TaxEvent::TaxCalculated {
            order,
            result: TaxResult::success(Decimal::ZERO),
        });
    }

    fn finished(&self, kind: RequestKind, order: OrderReference) -> bool {
        self.publish(TaxEvent::TransactionFinished {
            kind,
            order,
            error: String::new(),
        });
        true
    }
}

impl Default for NoIntegration {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_list() -> serde_json::Value {
    serde_json::json!({ "value": [] })
}

#[async_trait]
impl TaxService for NoIntegration {
    async fn test(&mut self, _credentials: Credentials) {
        self.publish(TaxEvent::ConnectionTested {
            error: String::new(),
        });
    }

    async fn get_tax_codes(&mut self) {
        self.publish(TaxEvent::TaxCodesFetched {
            codes: empty_list(),
            error: String::new(),
        });
    }

    async fn get_tax_exempt_categories(&mut self, _credentials: Option<Credentials>) {
        self.publish(TaxEvent::TaxExemptCategoriesFetched {
            categories: empty_list(),
            error: String::new(),
        });
    }

    async fn calculate_tax(&mut self, order_type: OrderType, order_id: i64, _record: bool) {
        self.zero_tax(OrderReference::new(order_type, order_id));
    }

    async fn commit(&mut self, order_type: OrderType, order_id: i64) -> bool {
        let order = OrderReference::new(order_type, order_id);
        self.zero_tax(order.clone());
        self.finished(RequestKind::CommitTransaction, order)
    }

    async fn cancel(&mut self, order_type: OrderType, order_id: i64, order_number: &str) -> bool {
        let order = OrderReference::new(order_type, order_id).with_number(order_number);
        self.finished(RequestKind::VoidTransaction, order)
    }

    async fn refund(&mut self, invoice_id: i64, _refund_date: NaiveDate) -> bool {
        let order = OrderReference::new(OrderType::invoice(), invoice_id);
        self.finished(RequestKind::RefundTransaction, order)
    }

    async fn wait(&mut self) {}

    fn error(&self) -> &str {
        ""
    }

    fn subscribe(&self) -> broadcast::Receiver<TaxEvent> {
        self.events.subscribe()
    }

    async fn run_listener(&mut self) -> Result<(), StoreError> {
        let mut notices = self
            .notices
            .take()
            .ok_or_else(|| StoreError::Subscription("not listening".into()))?;
        while let Some(notice) = notices.recv().await {
            self.zero_tax(notice.order());
        }
        Ok(())
    }
}
