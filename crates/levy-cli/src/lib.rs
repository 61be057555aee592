//! # levy-cli — Operator CLI
//!
//! Provides the `levy` command-line interface over the tax service facade.
//!
//! ## Subcommands
//!
//! - `levy test` — connection test with explicit credentials.
//! - `levy tax-codes`, `levy exempt-codes` — catalogue lookups.
//! - `levy calculate`, `levy commit`, `levy void`, `levy refund` — order operations.
//! - `levy listen` — serve `calculatetax` notifications until interrupted.
//!
//! Every order operation waits for its requests and prints a JSON report:
//!
//! ```bash
//! levy calculate --order-type CM --order-id 42 --record
//! levy void --order-type SO --order-id 9 --order-number 50091
//! ```

pub mod listen;
pub mod tax;

use levy_core::TaxEvent;
use serde::Serialize;
use tokio::sync::broadcast;

/// Result of one CLI operation, printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Accumulated error, empty on success.
    pub error: String,
    /// Events published while the operation ran.
    pub events: Vec<TaxEvent>,
}

impl Report {
    /// Exit code for this report.
    pub fn exit_code(&self) -> u8 {
        if self.ok {
            0
        } else {
            1
        }
    }
}

/// Collect every event already queued on `events`.
pub fn drain_events(events: &mut broadcast::Receiver<TaxEvent>) -> Vec<TaxEvent> {
    let mut out = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    out
}

/// Pretty-print `value` on stdout.
pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
