//! The [`TaxService`] trait implemented by every integration, and the busy
//! indicator hook held while [`TaxService::wait`] blocks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use levy_core::{Credentials, OrderType, StoreError, TaxEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of the event broadcast channel.
pub(crate) const EVENT_CAPACITY: usize = 256;

/// Whether an integration serves `calculatetax` notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenMode {
    /// Only explicit calls.
    #[default]
    Direct,
    /// Subscribe to `calculatetax` at construction.
    Listening,
}

/// Operations exposed to order-entry code.
///
/// Operations return once their requests are issued; [`TaxService::wait`]
/// blocks until every outstanding request has completed. Results arrive as
/// [`TaxEvent`]s on [`TaxService::subscribe`] and as the accumulated
/// [`TaxService::error`].
#[async_trait]
pub trait TaxService: Send {
    /// Test a connection with explicit (possibly unsaved) credentials.
    async fn test(&mut self, credentials: Credentials);

    /// Fetch the tax code catalogue.
    async fn get_tax_codes(&mut self);

    /// Fetch the exemption categories, optionally with explicit credentials.
    async fn get_tax_exempt_categories(&mut self, credentials: Option<Credentials>);

    /// Calculate tax for an order; `record` records the transaction.
    async fn calculate_tax(&mut self, order_type: OrderType, order_id: i64, record: bool);

    /// Record tax for an order, then commit it. True on success.
    async fn commit(&mut self, order_type: OrderType, order_id: i64) -> bool;

    /// Void an order's transaction. True on success.
    async fn cancel(&mut self, order_type: OrderType, order_id: i64, order_number: &str) -> bool;

    /// Refund an invoice as of `refund_date`. True on success.
    async fn refund(&mut self, invoice_id: i64, refund_date: NaiveDate) -> bool;

    /// Block until no request is outstanding.
    async fn wait(&mut self);

    /// Errors accumulated by the current operation, newline separated.
    fn error(&self) -> &str;

    /// Receive every event published from now on.
    fn subscribe(&self) -> broadcast::Receiver<TaxEvent>;

    /// Serve `calculatetax` notices until the channel closes.
    async fn run_listener(&mut self) -> Result<(), StoreError>;
}

/// Busy feedback while [`TaxService::wait`] blocks.
pub trait BusyIndicator: Send {
    /// Called with `true` on entry and `false` on exit.
    fn set_busy(&mut self, busy: bool);
}

/// Indicator shared between the facade and an active [`BusyGuard`].
pub(crate) type SharedIndicator = Arc<Mutex<Box<dyn BusyIndicator>>>;

/// Holds the indicator busy until dropped.
///
/// The facade keeps its own handle, so dropping a `wait()` future partway
/// resets the indicator without losing it.
pub(crate) struct BusyGuard {
    indicator: Option<SharedIndicator>,
}

impl BusyGuard {
    pub(crate) fn new(indicator: Option<SharedIndicator>) -> Self {
        if let Some(i) = &indicator {
            i.lock().set_busy(true);
        }
        Self { indicator }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if let Some(i) = &self.indicator {
            i.lock().set_busy(false);
        }
    }
}
