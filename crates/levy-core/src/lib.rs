#![deny(missing_docs)]

//! # levy-core — Foundational Types for the levy Tax Integration
//!
//! This crate defines the types every other levy crate depends on. It does
//! no I/O of its own.
//!
//! ## Design Principles
//!
//! 1. **A closed [`RequestKind`] enum.** The HTTP verb, URL template,
//!    supersession rule and response handling are all decided by `match`
//!    on the kind, so adding a kind is a compile error until every site
//!    handles it.
//!
//! 2. **Configuration is a value.** [`ServiceConfig`] is loaded once per
//!    integration object and never mutated; reconfiguring means building a
//!    new integration.
//!
//! 3. **The database is a collaborator.** [`TaxStore`] is the only door to
//!    order data, persisted settings and the `calculatetax` channel.
//!
//! 4. **[`LevyError`] hierarchy.** Structured errors with `thiserror`. Errors
//!    that cross the asynchronous boundary travel as strings on
//!    [`TaxEvent`]s, because that is what order-entry screens show.

pub mod config;
pub mod error;
pub mod event;
pub mod kind;
pub mod notice;
pub mod order;
pub mod store;

pub use config::{Credentials, ServiceConfig, TaxProvider};
pub use error::{BuildError, ConfigError, LevyError, StoreError, ValidationError};
pub use event::{TaxEvent, TaxResult};
pub use kind::{HttpMethod, RequestKind};
pub use notice::{CalculateTaxNotice, CALCULATE_TAX_CHANNEL};
pub use order::{OrderReference, OrderType};
pub use store::{default_target, PayloadRequest, RequestTarget, TargetQuery, TaxStore};

/// Service API version used in URLs and the client description header.
pub const API_VERSION: &str = "v2";
