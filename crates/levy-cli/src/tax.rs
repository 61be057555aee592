//! # Tax Subcommands
//!
//! One-shot operations against the configured tax service. Each runs the
//! facade operation, waits for outstanding requests and reports the events
//! published in the meantime.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use levy_client::TaxService;
use levy_core::{Credentials, OrderType};
use url::Url;

use crate::{drain_events, print_json, Report};

/// Explicit credentials for `levy test`.
#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Account number.
    #[arg(long)]
    pub account: String,

    /// License key.
    #[arg(long)]
    pub key: String,

    /// Service base URL.
    #[arg(long, default_value = "https://sandbox-rest.avatax.com/")]
    pub url: Url,

    /// Company code.
    #[arg(long, default_value = "DEFAULT")]
    pub company: String,
}

impl From<&TestArgs> for Credentials {
    fn from(args: &TestArgs) -> Self {
        Credentials {
            account: args.account.clone(),
            key: args.key.clone(),
            base_url: args.url.clone(),
            company: args.company.clone(),
        }
    }
}

/// Order selection shared by the order subcommands.
#[derive(Args, Debug, Clone)]
pub struct OrderArgs {
    /// Order type tag (e.g. CM, INV, SO).
    #[arg(long)]
    pub order_type: OrderType,

    /// Order header id.
    #[arg(long)]
    pub order_id: i64,
}

/// Tax service subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum TaxCommand {
    /// Test a connection with explicit credentials.
    Test(TestArgs),

    /// List tax codes.
    TaxCodes,

    /// List exemption categories.
    ExemptCodes,

    /// Calculate tax for an order.
    Calculate {
        #[command(flatten)]
        order: OrderArgs,

        /// Record the transaction instead of only quoting it.
        #[arg(long)]
        record: bool,
    },

    /// Record and commit an order's tax.
    Commit(OrderArgs),

    /// Void an order's tax transaction.
    Void {
        #[command(flatten)]
        order: OrderArgs,

        /// Order number the transaction was recorded under.
        #[arg(long)]
        order_number: String,
    },

    /// Refund an invoice.
    Refund {
        /// Invoice header id.
        #[arg(long)]
        invoice_id: i64,

        /// Date the refund takes effect (YYYY-MM-DD).
        #[arg(long)]
        refund_date: NaiveDate,
    },
}

/// Run `command` to completion and collect its report.
pub async fn execute(svc: &mut dyn TaxService, command: &TaxCommand) -> Report {
    let mut events = svc.subscribe();
    let ok = match command {
        TaxCommand::Test(args) => {
            svc.test(Credentials::from(args)).await;
            svc.wait().await;
            svc.error().is_empty()
        }
        TaxCommand::TaxCodes => {
            svc.get_tax_codes().await;
            svc.wait().await;
            svc.error().is_empty()
        }
        TaxCommand::ExemptCodes => {
            svc.get_tax_exempt_categories(None).await;
            svc.wait().await;
            svc.error().is_empty()
        }
        TaxCommand::Calculate { order, record } => {
            svc.calculate_tax(order.order_type.clone(), order.order_id, *record)
                .await;
            svc.wait().await;
            svc.error().is_empty()
        }
        TaxCommand::Commit(order) => svc.commit(order.order_type.clone(), order.order_id).await,
        TaxCommand::Void {
            order,
            order_number,
        } => {
            svc.cancel(order.order_type.clone(), order.order_id, order_number)
                .await
        }
        TaxCommand::Refund {
            invoice_id,
            refund_date,
        } => svc.refund(*invoice_id, *refund_date).await,
    };

    Report {
        ok,
        error: svc.error().to_string(),
        events: drain_events(&mut events),
    }
}

/// Execute a tax subcommand and print its report.
///
/// Returns exit code: 0 on success, 1 when the operation failed.
pub async fn run_tax(svc: &mut dyn TaxService, command: &TaxCommand) -> Result<u8> {
    let report = execute(svc, command).await;
    if !report.ok {
        tracing::error!("{}", report.error);
    }
    print_json(&report)?;
    Ok(report.exit_code())
}
