//! Persisted tax-service settings, stored as ERP metrics.
//!
//! | Metric | Meaning |
//! |--------|---------|
//! | `TaxService` | `A` = Avalara, anything else = no integration |
//! | `ServerVersion` | ERP version reported to the service |
//! | `NoAvaTaxCommit` | suppress commit/void/refund |
//! | `LogTaxService` | enable the audit log |
//! | `TaxServiceLogFile` | audit log path |
//! | `AvalaraAccount`, `AvalaraKey`, `AvalaraUrl`, `AvalaraCompany` | credentials |

use std::collections::HashMap;
use std::path::PathBuf;

use levy_core::config::parse_flag;
use levy_core::{Credentials, ServiceConfig, StoreError, TaxProvider};
use url::Url;

/// Metric names read by [`service_config_from_metrics`].
pub const SERVICE_METRICS: [&str; 9] = [
    "TaxService",
    "ServerVersion",
    "NoAvaTaxCommit",
    "LogTaxService",
    "TaxServiceLogFile",
    "AvalaraAccount",
    "AvalaraKey",
    "AvalaraUrl",
    "AvalaraCompany",
];

/// Company code used when `AvalaraCompany` is unset.
const DEFAULT_COMPANY: &str = "DEFAULT";

/// Build a [`ServiceConfig`] from metric name/value pairs.
///
/// Credentials are only present when account, key and URL are all set.
pub fn service_config_from_metrics(
    metrics: &HashMap<String, String>,
) -> Result<ServiceConfig, StoreError> {
    let get = |name: &str| {
        metrics
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let credentials = match (get("AvalaraAccount"), get("AvalaraKey"), get("AvalaraUrl")) {
        (Some(account), Some(key), Some(url)) => Some(Credentials {
            account: account.to_string(),
            key: key.to_string(),
            base_url: Url::parse(url).map_err(|e| StoreError::Decode {
                what: "AvalaraUrl metric".into(),
                reason: e.to_string(),
            })?,
            company: get("AvalaraCompany").unwrap_or(DEFAULT_COMPANY).to_string(),
        }),
        _ => None,
    };

    Ok(ServiceConfig {
        provider: TaxProvider::from_flag(get("TaxService")),
        server_version: get("ServerVersion").unwrap_or_default().to_string(),
        suppress_commits: parse_flag(get("NoAvaTaxCommit")),
        logging_enabled: parse_flag(get("LogTaxService")),
        log_file_path: get("TaxServiceLogFile").map(PathBuf::from),
        credentials,
    })
}
