//! # Error Hierarchy
//!
//! Structured error types for the levy workspace, built with `thiserror`.
//! No `Box<dyn Error>`, no `.unwrap()` outside tests.
//!
//! Errors that cross the asynchronous boundary to the tax service are not
//! represented here: those are carried as plain strings on
//! [`TaxResult`](crate::TaxResult) and [`TaxEvent`](crate::TaxEvent), because
//! that is what order-entry callers display.

use thiserror::Error;

/// Top-level error type for levy.
#[derive(Error, Debug)]
pub enum LevyError {
    /// Domain primitive validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The data store could not answer a query.
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    /// An outbound request could not be assembled.
    #[error("request build error: {0}")]
    Build(#[from] BuildError),

    /// Local configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Validation errors for domain primitive newtypes and notification payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Order type tag is empty, too long, or contains non-alphanumeric characters.
    #[error("invalid order type: \"{0}\" (expected 1-16 ASCII alphanumeric characters)")]
    InvalidOrderType(String),

    /// Request kind tag is not one of the known kinds.
    #[error("unknown request kind: \"{0}\"")]
    UnknownKind(String),

    /// A base URL has no hierarchical path to append request segments to.
    #[error("base URL cannot carry a path: \"{0}\"")]
    InvalidBaseUrl(String),

    /// A `calculatetax` notification payload could not be parsed.
    #[error("malformed calculatetax notice: \"{payload}\": {reason}")]
    MalformedNotice {
        /// The raw payload as received.
        payload: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors returned by a [`TaxStore`](crate::TaxStore) implementation.
///
/// These are the "configuration/resolution" and "persistence" failures of
/// the integration: they are reported through the generic error channel and
/// never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The query ran but returned no row.
    #[error("no {what} found")]
    NotFound {
        /// Description of what was looked up.
        what: String,
    },

    /// The database rejected the query or the connection failed.
    #[error("database error: {0}")]
    Database(String),

    /// A row came back but could not be decoded into the expected shape.
    #[error("could not decode {what}: {reason}")]
    Decode {
        /// Description of the value being decoded.
        what: String,
        /// Decoder message.
        reason: String,
    },

    /// The notification subscription could not be established or was closed.
    #[error("notification channel error: {0}")]
    Subscription(String),
}

/// Errors while assembling an outbound tax-service request.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Neither an explicit override nor persisted credentials are available.
    #[error("no tax service credentials are configured")]
    MissingCredentials,

    /// URL/header resolution through the data store failed.
    #[error("could not resolve {kind} request: {source}")]
    Store {
        /// Tag of the request kind being built.
        kind: &'static str,
        /// Underlying store failure.
        source: StoreError,
    },

    /// The payload is not valid JSON.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Tag of the request kind being built.
        kind: &'static str,
        /// Parser message.
        reason: String,
    },

    /// A resolved header name or value is not valid HTTP.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// Header name as resolved.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Local configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
