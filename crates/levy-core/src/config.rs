//! # Service Configuration
//!
//! Settings persisted by the ERP and read once when an integration object is
//! constructed. Reconfiguration means constructing a new integration; nothing
//! here is mutated after load.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Account credentials and endpoint for the tax service.
///
/// Custom `Debug` implementation redacts the `key` field
/// to prevent credential leakage in log output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account number.
    pub account: String,
    /// License key.
    pub key: String,
    /// Service base URL, e.g. `https://sandbox-rest.avatax.com/`.
    pub base_url: Url,
    /// Company code transactions are recorded under.
    pub company: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("company", &self.company)
            .finish()
    }
}

/// Which tax service implementation is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaxProvider {
    /// No external service; tax is always zero.
    #[default]
    None,
    /// Avalara AvaTax.
    Avalara,
}

impl TaxProvider {
    /// Interpret the persisted `TaxService` flag. `"A"` selects Avalara;
    /// anything else, including an unset flag, means no integration.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some("A") => Self::Avalara,
            _ => Self::None,
        }
    }
}

/// Persisted tax-service settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Configured provider.
    pub provider: TaxProvider,
    /// ERP server version reported in the client description header.
    pub server_version: String,
    /// Turn commit, void and refund into silent no-ops (sandbox/demo setups).
    pub suppress_commits: bool,
    /// Append every request/response pair to the audit log.
    pub logging_enabled: bool,
    /// Audit log location; logging is skipped when unset.
    pub log_file_path: Option<PathBuf>,
    /// Persisted account credentials, when configured.
    pub credentials: Option<Credentials>,
}

impl ServiceConfig {
    /// Audit log path, if logging is enabled and a path is configured.
    pub fn audit_log_path(&self) -> Option<&PathBuf> {
        if self.logging_enabled {
            self.log_file_path.as_ref()
        } else {
            None
        }
    }
}

/// Parse the ERP's boolean metric encoding (`t`, `true`, `1`, `y`, `yes`).
pub fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("t" | "true" | "1" | "y" | "yes")
    )
}
