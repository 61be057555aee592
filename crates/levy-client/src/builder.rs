//! # Request Builder
//!
//! Turns `(kind, order, payload, credentials)` into a transport-ready
//! [`OutboundRequest`]. URL and extra headers come from the data store; the
//! authorization and product-identification headers are computed here.

use base64::Engine;
use levy_core::{
    BuildError, Credentials, HttpMethod, OrderReference, RequestKind, ServiceConfig, TargetQuery,
    TaxStore, API_VERSION,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use url::Url;

use crate::config::ClientConfig;

/// A fully formed request, ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Request kind.
    pub kind: RequestKind,
    /// HTTP verb.
    pub method: HttpMethod,
    /// Resolved URL.
    pub url: Url,
    /// All request headers.
    pub headers: HeaderMap,
    /// Compact JSON body for POST kinds, `None` for GET kinds.
    pub body: Option<String>,
}

/// Builds outbound requests from store lookups and configuration.
#[derive(Clone, Copy)]
pub struct TaxRequestBuilder<'a> {
    store: &'a dyn TaxStore,
    service: &'a ServiceConfig,
    client: &'a ClientConfig,
}

impl<'a> TaxRequestBuilder<'a> {
    /// Create a builder over the given store and configuration.
    pub fn new(
        store: &'a dyn TaxStore,
        service: &'a ServiceConfig,
        client: &'a ClientConfig,
    ) -> Self {
        Self {
            store,
            service,
            client,
        }
    }

    /// Build a request.
    ///
    /// `credentials` overrides the persisted credentials (connection tests
    /// with unsaved settings); otherwise [`ServiceConfig::credentials`] is
    /// used. The only side effect is the store lookup.
    pub async fn build(
        &self,
        kind: RequestKind,
        order: &OrderReference,
        payload: &str,
        credentials: Option<&Credentials>,
    ) -> Result<OutboundRequest, BuildError> {
        let credentials = credentials
            .or(self.service.credentials.as_ref())
            .ok_or(BuildError::MissingCredentials)?;

        let target = self
            .store
            .resolve_target(TargetQuery {
                kind,
                order,
                credentials,
                api_version: API_VERSION,
            })
            .await
            .map_err(|source| BuildError::Store {
                kind: kind.tag(),
                source,
            })?;

        let method = kind.method();
        let body = match method {
            HttpMethod::Get => None,
            HttpMethod::Post => Some(compact_json(kind, payload)?),
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value("Authorization", &basic_auth(credentials))?);
        headers.insert(
            HeaderName::from_static("x-avalara-uid"),
            header_value("X-Avalara-UID", &self.client.client_uid)?,
        );
        headers.insert(
            HeaderName::from_static("x-avalara-client"),
            header_value(
                "X-Avalara-Client",
                &self.client.client_description(&self.service.server_version),
            )?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &target.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| BuildError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            headers.insert(header_name, header_value(name, value)?);
        }

        Ok(OutboundRequest {
            kind,
            method,
            url: target.url,
            headers,
            body,
        })
    }
}

/// `Basic base64(account:key)`.
pub fn basic_auth(credentials: &Credentials) -> String {
    let token = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", credentials.account, credentials.key));
    format!("Basic {token}")
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(value).map_err(|e| BuildError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn compact_json(kind: RequestKind, payload: &str) -> Result<String, BuildError> {
    serde_json::from_str::<serde_json::Value>(payload)
        .map(|doc| doc.to_string())
        .map_err(|e| BuildError::InvalidPayload {
            kind: kind.tag(),
            reason: e.to_string(),
        })
}
