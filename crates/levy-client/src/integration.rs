//! # AvaTax Integration
//!
//! The facade order-entry code talks to. Operations issue requests through
//! the [`TaxServiceTransport`] and return; [`TaxService::wait`] then drains
//! the completion queue until nothing is outstanding, correlating each
//! response and publishing its events.
//!
//! ## Error accumulation
//!
//! Each public operation starts with an empty error and remembers the
//! requests it dispatched. Errors from those requests, and data store
//! failures raised while issuing them, are appended on their own line.
//! `wait()` still drains every outstanding request and publishes all events,
//! but a failure belonging to another call never leaks into this one.
//!
//! ## Suppressed commits
//!
//! A suppressed commit, void or refund never reaches the in-flight set, so
//! `wait()` returns immediately and no completion event is ever published.
//! `commit`, `cancel` and `refund` then report success.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use levy_core::{
    CalculateTaxNotice, ConfigError, Credentials, OrderReference, OrderType, PayloadRequest,
    RequestKind, ServiceConfig, StoreError, TaxEvent, TaxStore,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::audit::AuditLog;
use crate::builder::TaxRequestBuilder;
use crate::config::ClientConfig;
use crate::correlator::{Outcome, TaxResponseCorrelator};
use crate::service::{BusyGuard, BusyIndicator, SharedIndicator, TaxService, EVENT_CAPACITY};
use crate::transport::{Dispatch, RawResponse, RequestId, TaxServiceTransport};

/// Avalara AvaTax implementation of [`TaxService`].
pub struct AvalaraIntegration<S: TaxStore + 'static> {
    store: Arc<S>,
    service: ServiceConfig,
    client: ClientConfig,
    transport: TaxServiceTransport,
    audit: Option<AuditLog>,
    events: broadcast::Sender<TaxEvent>,
    error: String,
    operation: HashSet<RequestId>,
    busy: Option<SharedIndicator>,
    notices: Option<mpsc::Receiver<CalculateTaxNotice>>,
}

impl<S: TaxStore + 'static> AvalaraIntegration<S> {
    /// Create an integration over an already loaded [`ServiceConfig`].
    pub fn new(
        store: Arc<S>,
        service: ServiceConfig,
        client: ClientConfig,
    ) -> Result<Self, ConfigError> {
        let transport = TaxServiceTransport::new(client.http_client()?, service.suppress_commits);
        let audit = service.audit_log_path().map(AuditLog::new);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            service,
            client,
            transport,
            audit,
            events,
            error: String::new(),
            operation: HashSet::new(),
            busy: None,
            notices: None,
        })
    }

    /// Drive `indicator` while [`TaxService::wait`] blocks.
    pub fn with_busy_indicator(mut self, indicator: Box<dyn BusyIndicator>) -> Self {
        self.busy = Some(Arc::new(Mutex::new(indicator)));
        self
    }

    /// Subscribe to `calculatetax` notices, to be served by
    /// [`TaxService::run_listener`].
    pub async fn listen(&mut self) -> Result<(), StoreError> {
        self.notices = Some(self.store.subscribe_calculate_tax().await?);
        Ok(())
    }

    /// Settings this integration was built with.
    pub fn service_config(&self) -> &ServiceConfig {
        &self.service
    }

    /// Number of requests currently in flight.
    pub fn pending_requests(&self) -> usize {
        self.transport.in_flight()
    }

    async fn dispatch(
        &mut self,
        kind: RequestKind,
        order: OrderReference,
        payload: &str,
        credentials: Option<&Credentials>,
    ) -> Option<Dispatch> {
        let builder = TaxRequestBuilder::new(self.store.as_ref(), &self.service, &self.client);
        match self
            .transport
            .dispatch(&builder, kind, order.clone(), payload, credentials)
            .await
        {
            Ok(dispatch) => {
                if let Dispatch::Sent(id) = dispatch {
                    self.operation.insert(id);
                }
                Some(dispatch)
            }
            Err(e) => {
                self.report_failure(format!("building {} request for {order}", kind.label()), e);
                None
            }
        }
    }

    /// Resolve a payload and dispatch it; store failures are reported.
    async fn dispatch_payload(&mut self, kind: RequestKind, request: PayloadRequest) {
        let order = request.order();
        match self.store.resolve_payload(&request).await {
            Ok(payload) => {
                self.dispatch(kind, order, &payload, None).await;
            }
            Err(e) => {
                let context = format!("resolving {} payload for {order}", request.tag());
                self.report_failure(context, e);
            }
        }
    }

    async fn handle_completion(&mut self, raw: RawResponse) {
        let owned = self.operation.remove(&raw.id);
        let correlator = TaxResponseCorrelator::new(self.store.as_ref(), self.audit.as_ref());
        if let Outcome::Delivered(events) = correlator.correlate(&mut self.transport, raw).await {
            for event in events {
                if owned {
                    self.record_error(&event);
                }
                self.publish(event);
            }
        }
    }

    fn report_failure(&mut self, context: String, error: impl std::fmt::Display) {
        tracing::error!("{context}: {error}");
        let event = TaxEvent::StoreFailure {
            context,
            message: error.to_string(),
        };
        self.record_error(&event);
        self.publish(event);
    }

    /// Append the error `event` carries to the current operation's error.
    fn record_error(&mut self, event: &TaxEvent) {
        let message = match event {
            TaxEvent::StoreFailure { context, message } => format!("{context}: {message}"),
            other => other.error().to_string(),
        };
        if !message.is_empty() {
            if !self.error.is_empty() {
                self.error.push('\n');
            }
            self.error.push_str(&message);
        }
    }

    fn publish(&self, event: TaxEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn begin(&mut self) {
        self.error.clear();
        self.operation.clear();
    }
}

#[async_trait]
impl<S: TaxStore + 'static> TaxService for AvalaraIntegration<S> {
    async fn test(&mut self, credentials: Credentials) {
        self.begin();
        self.dispatch(
            RequestKind::Test,
            OrderReference::none(),
            "",
            Some(&credentials),
        )
        .await;
    }

    async fn get_tax_codes(&mut self) {
        self.begin();
        self.dispatch(RequestKind::ListTaxCodes, OrderReference::none(), "", None)
            .await;
    }

    async fn get_tax_exempt_categories(&mut self, credentials: Option<Credentials>) {
        self.begin();
        self.dispatch(
            RequestKind::ListExemptCodes,
            OrderReference::none(),
            "",
            credentials.as_ref(),
        )
        .await;
    }

    async fn calculate_tax(&mut self, order_type: OrderType, order_id: i64, record: bool) {
        self.begin();
        let order = OrderReference::new(order_type, order_id);
        self.dispatch_payload(
            RequestKind::CreateOrAdjustTransaction,
            PayloadRequest::Calculate { order, record },
        )
        .await;
    }

    async fn commit(&mut self, order_type: OrderType, order_id: i64) -> bool {
        let order = OrderReference::new(order_type.clone(), order_id);
        self.calculate_tax(order_type, order_id, true).await;
        self.wait().await;
        if !self.error.is_empty() {
            tracing::warn!(%order, "not committing, tax calculation failed");
            return false;
        }
        self.dispatch_payload(RequestKind::CommitTransaction, PayloadRequest::Post { order })
            .await;
        self.wait().await;
        self.error.is_empty()
    }

    async fn cancel(&mut self, order_type: OrderType, order_id: i64, order_number: &str) -> bool {
        self.begin();
        let order = OrderReference::new(order_type, order_id).with_number(order_number);
        let aborted = self.transport.cancel(&order);
        if aborted > 0 {
            tracing::debug!(%order, aborted, "aborted pending requests before void");
        }
        self.dispatch_payload(RequestKind::VoidTransaction, PayloadRequest::Void { order })
            .await;
        self.wait().await;
        self.error.is_empty()
    }

    async fn refund(&mut self, invoice_id: i64, refund_date: NaiveDate) -> bool {
        self.begin();
        self.dispatch_payload(
            RequestKind::RefundTransaction,
            PayloadRequest::Refund {
                invoice_id,
                refund_date,
            },
        )
        .await;
        self.wait().await;
        self.error.is_empty()
    }

    async fn wait(&mut self) {
        if self.transport.in_flight() == 0 {
            return;
        }
        let _busy = BusyGuard::new(self.busy.clone());
        while self.transport.in_flight() > 0 {
            match self.transport.next_completion().await {
                Some(raw) => self.handle_completion(raw).await,
                None => break,
            }
        }
    }

    fn error(&self) -> &str {
        &self.error
    }

    fn subscribe(&self) -> broadcast::Receiver<TaxEvent> {
        self.events.subscribe()
    }

    async fn run_listener(&mut self) -> Result<(), StoreError> {
        let mut notices = self
            .notices
            .take()
            .ok_or_else(|| StoreError::Subscription("not listening".into()))?;
        tracing::info!("serving calculatetax notices");
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(notice) => {
                        tracing::debug!(
                            order = %notice.order(),
                            record = notice.record,
                            "calculatetax notice"
                        );
                        self.calculate_tax(notice.order_type, notice.order_id, notice.record)
                            .await;
                    }
                    None => break,
                },
                Some(raw) = self.transport.next_completion() => self.handle_completion(raw).await,
            }
        }
        self.wait().await;
        tracing::info!("calculatetax channel closed");
        Ok(())
    }
}
