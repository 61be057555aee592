//! # Listen Subcommand
//!
//! Serves `calculatetax` notifications from the database until the channel
//! closes or the process is interrupted. Every published event is printed as
//! one JSON line.

use anyhow::Result;
use levy_client::TaxService;
use levy_core::TaxEvent;
use tokio::sync::broadcast;

/// Serve notices until the channel closes or Ctrl-C.
///
/// Returns exit code 0 on a clean shutdown.
pub async fn run_listen(svc: &mut dyn TaxService) -> Result<u8> {
    let printer = tokio::spawn(print_events(svc.subscribe()));

    tokio::select! {
        served = svc.run_listener() => served?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, stopping listener"),
    }

    printer.abort();
    Ok(0)
}

async fn print_events(mut events: broadcast::Receiver<TaxEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("failed to serialize event: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
