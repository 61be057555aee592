//! # levy-store — Data Store Implementations
//!
//! Two [`TaxStore`](levy_core::TaxStore) implementations:
//!
//! - [`PgTaxStore`]: the ERP's Postgres database. Settings come from the
//!   `metric` table, request targets and payloads from schema functions, and
//!   `calculatetax` notices from `LISTEN`.
//! - [`MemoryTaxStore`]: process memory, for development without a database
//!   and for tests.

pub mod memory;
pub mod metrics;
pub mod pg;

pub use memory::{MemoryTaxStore, SavedTax};
pub use metrics::{service_config_from_metrics, SERVICE_METRICS};
pub use pg::{init_pool, PgTaxStore};
