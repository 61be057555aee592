//! Client-side configuration for the tax service integration.
//!
//! Persisted service settings (credentials, suppress flag, audit log) come
//! from the data store as a [`levy_core::ServiceConfig`]. This module covers
//! what belongs to the running process instead: timeouts and how the client
//! identifies itself.

use std::time::Duration;

use levy_core::{ConfigError, API_VERSION};

/// Client identifier sent in the `X-Avalara-UID` header.
pub const CLIENT_UID: &str = "a0o33000004FH8l";

/// Process-level configuration for outbound requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Transport timeout in seconds.
    pub timeout_secs: u64,
    /// Host name reported in the client description header.
    pub hostname: String,
    /// Product name reported in the client description header.
    pub product: String,
    /// Value of the `X-Avalara-UID` header.
    pub client_uid: String,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `LEVY_TIMEOUT_SECS` (default: 30)
    /// - `LEVY_HOSTNAME` (default: `HOSTNAME`, then `localhost`)
    /// - `LEVY_PRODUCT` (default: `levy`)
    pub fn from_env() -> Self {
        Self {
            timeout_secs: std::env::var("LEVY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            hostname: std::env::var("LEVY_HOSTNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "localhost".to_string()),
            product: std::env::var("LEVY_PRODUCT").unwrap_or_else(|_| "levy".to_string()),
            client_uid: CLIENT_UID.to_string(),
        }
    }

    /// Configuration for tests against local mock servers.
    pub fn local_mock() -> Self {
        Self {
            timeout_secs: 5,
            hostname: "localhost".to_string(),
            product: "levy".to_string(),
            client_uid: CLIENT_UID.to_string(),
        }
    }

    /// `X-Avalara-Client` value: `<product>; <version>; REST; v2; <hostname>`.
    pub fn client_description(&self, server_version: &str) -> String {
        format!(
            "{}; {}; REST; {}; {}",
            self.product, server_version, API_VERSION, self.hostname
        )
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
