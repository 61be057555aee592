//! Transport error types.
//!
//! Transport failures never propagate as `Err` out of the facade: they are
//! rendered to strings and carried on the eventual response, where the
//! correlator folds them into the per-kind error.

/// Failures of a single outbound HTTP call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection, TLS or timeout failure.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        /// Request URL.
        endpoint: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}")]
    Status {
        /// Status code.
        status: u16,
    },
    /// The response body could not be read.
    #[error("failed to read response from {endpoint}: {source}")]
    Body {
        /// Request URL.
        endpoint: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
}
