//! # levy-client — Tax Service Integration
//!
//! Request dispatch, supersession, response correlation and the
//! blocking-style facade over the Avalara AvaTax REST API.
//!
//! ## Flow
//!
//! ```text
//! facade operation ─▶ TaxRequestBuilder ─▶ TaxServiceTransport ─▶ tokio task (reqwest)
//!                                                 │                       │
//!                                  supersede / cancel             completion queue
//!                                                                         │
//! wait() / run_listener() ◀── TaxEvent ◀── TaxResponseCorrelator ◀────────┘
//! ```
//!
//! The facade is single-owner (`&mut self`); there is no shared mutable
//! state and no locking. Only the HTTP exchanges run concurrently.
//!
//! ## Selection
//!
//! [`connect`] loads the persisted [`ServiceConfig`](levy_core::ServiceConfig)
//! once and returns [`AvalaraIntegration`] or [`NoIntegration`] behind the
//! [`TaxService`] trait. Changing settings means calling [`connect`] again.

pub mod audit;
pub mod builder;
pub mod config;
pub mod correlator;
pub mod error;
pub mod integration;
pub mod none;
pub mod service;
pub mod transport;

pub use audit::AuditLog;
pub use builder::{OutboundRequest, TaxRequestBuilder};
pub use config::ClientConfig;
pub use correlator::{extract_error, Outcome, TaxResponseCorrelator, INVALID_AUTHENTICATION};
pub use error::TransportError;
pub use integration::AvalaraIntegration;
pub use none::NoIntegration;
pub use service::{BusyIndicator, ListenMode, TaxService};
pub use transport::{Dispatch, PendingRequest, RawResponse, RequestId, TaxServiceTransport};

use std::sync::Arc;

use levy_core::{LevyError, TaxProvider, TaxStore};

/// Load the persisted settings and build the configured integration.
pub async fn connect<S: TaxStore + 'static>(
    store: Arc<S>,
    client: ClientConfig,
    mode: ListenMode,
) -> Result<Box<dyn TaxService>, LevyError> {
    let service = store.load_service_config().await?;
    tracing::info!(
        provider = ?service.provider,
        suppress_commits = service.suppress_commits,
        logging = service.logging_enabled,
        "tax service configured"
    );

    match service.provider {
        TaxProvider::Avalara => {
            let mut integration = AvalaraIntegration::new(store, service, client)?;
            if mode == ListenMode::Listening {
                integration.listen().await?;
            }
            Ok(Box::new(integration))
        }
        TaxProvider::None => {
            let mut integration = NoIntegration::new();
            if mode == ListenMode::Listening {
                integration.listen(store).await?;
            }
            Ok(Box::new(integration))
        }
    }
}
