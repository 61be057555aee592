//! # Request Kinds
//!
//! The closed set of operations levy performs against the tax service. The
//! kind determines the HTTP verb, the URL path, how the response is
//! interpreted, and which in-flight requests a new dispatch supersedes.
//!
//! ## Paths (AvaTax REST v2)
//!
//! | Kind | Method | Path |
//! |------|--------|------|
//! | `Test` | GET | `api/{v}/utilities/ping` |
//! | `ListTaxCodes` | GET | `api/{v}/definitions/taxcodes` |
//! | `ListExemptCodes` | GET | `api/{v}/definitions/entityusecodes` |
//! | `CreateOrAdjustTransaction` | POST | `api/{v}/transactions/createoradjust` |
//! | `CommitTransaction` | POST | `api/{v}/companies/{company}/transactions/{code}/commit` |
//! | `VoidTransaction` | POST | `api/{v}/companies/{company}/transactions/{code}/void` |
//! | `RefundTransaction` | POST | `api/{v}/companies/{company}/transactions/{code}/refund` |

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;
use crate::order::OrderReference;

/// HTTP verb used for a request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read-only lookups.
    Get,
    /// Mutating calls with a JSON body.
    Post,
}

/// Operation performed against the tax service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Credential/connectivity probe.
    Test,
    /// Fetch the tax code catalogue.
    ListTaxCodes,
    /// Fetch the exemption (entity use) code catalogue.
    ListExemptCodes,
    /// Calculate tax for an order, optionally recording the transaction.
    CreateOrAdjustTransaction,
    /// Post a recorded transaction.
    CommitTransaction,
    /// Void a recorded transaction.
    VoidTransaction,
    /// Refund an invoiced transaction.
    RefundTransaction,
}

impl RequestKind {
    /// Every kind, in declaration order.
    pub const ALL: [RequestKind; 7] = [
        Self::Test,
        Self::ListTaxCodes,
        Self::ListExemptCodes,
        Self::CreateOrAdjustTransaction,
        Self::CommitTransaction,
        Self::VoidTransaction,
        Self::RefundTransaction,
    ];

    /// HTTP verb for this kind.
    pub fn method(self) -> HttpMethod {
        match self {
            Self::Test | Self::ListTaxCodes | Self::ListExemptCodes => HttpMethod::Get,
            Self::CreateOrAdjustTransaction
            | Self::CommitTransaction
            | Self::VoidTransaction
            | Self::RefundTransaction => HttpMethod::Post,
        }
    }

    /// Whether requests of this kind are tied to a particular order.
    ///
    /// Order-independent kinds are global: a new one supersedes any pending
    /// request of the same kind.
    pub fn is_order_scoped(self) -> bool {
        matches!(self.method(), HttpMethod::Post)
    }

    /// Commit, void and refund. These become no-ops when commits are suppressed.
    pub fn is_commit_class(self) -> bool {
        matches!(
            self,
            Self::CommitTransaction | Self::VoidTransaction | Self::RefundTransaction
        )
    }

    /// Stable tag exchanged with the data store.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::ListTaxCodes => "taxcodes",
            Self::ListExemptCodes => "exemptcodes",
            Self::CreateOrAdjustTransaction => "createtransaction",
            Self::CommitTransaction => "committransaction",
            Self::VoidTransaction => "voidtransaction",
            Self::RefundTransaction => "refundtransaction",
        }
    }

    /// Human-readable name written to the audit log.
    pub fn label(self) -> &'static str {
        match self {
            Self::Test => "Test Connection",
            Self::ListTaxCodes => "List Tax Codes",
            Self::ListExemptCodes => "List Exempt Codes",
            Self::CreateOrAdjustTransaction => "Create Or Adjust Transaction",
            Self::CommitTransaction => "Commit Transaction",
            Self::VoidTransaction => "Void Transaction",
            Self::RefundTransaction => "Refund Transaction",
        }
    }

    /// Unencoded URL path segments (relative to the service base URL) for
    /// this kind.
    pub fn path_segments(
        self,
        api_version: &str,
        company: &str,
        order: &OrderReference,
    ) -> Vec<String> {
        let fixed = |group: &str, name: &str| {
            vec![
                "api".to_string(),
                api_version.to_string(),
                group.to_string(),
                name.to_string(),
            ]
        };
        let transaction = |action: &str| {
            vec![
                "api".to_string(),
                api_version.to_string(),
                "companies".to_string(),
                company.to_string(),
                "transactions".to_string(),
                order.transaction_code(),
                action.to_string(),
            ]
        };
        match self {
            Self::Test => fixed("utilities", "ping"),
            Self::ListTaxCodes => fixed("definitions", "taxcodes"),
            Self::ListExemptCodes => fixed("definitions", "entityusecodes"),
            Self::CreateOrAdjustTransaction => fixed("transactions", "createoradjust"),
            Self::CommitTransaction => transaction("commit"),
            Self::VoidTransaction => transaction("void"),
            Self::RefundTransaction => transaction("refund"),
        }
    }

    /// Full request URL under `base`, keeping any path prefix `base` has.
    ///
    /// Company and transaction code are percent-encoded as path segments.
    pub fn url(
        self,
        base: &Url,
        api_version: &str,
        company: &str,
        order: &OrderReference,
    ) -> Result<Url, ValidationError> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| ValidationError::InvalidBaseUrl(base.to_string()))?
            .pop_if_empty()
            .extend(self.path_segments(api_version, company, order));
        Ok(url)
    }

    /// Whether a new dispatch of `self` for `order` replaces a pending
    /// request of `pending_kind` for `pending_order`.
    ///
    /// Kinds never supersede each other. Within a kind, global kinds always
    /// supersede and order-scoped kinds supersede only for the same order.
    pub fn supersedes(
        self,
        order: &OrderReference,
        pending_kind: RequestKind,
        pending_order: &OrderReference,
    ) -> bool {
        self == pending_kind && (!self.is_order_scoped() || order.targets_same_order(pending_order))
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == s)
            .ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}
