//! # Transport
//!
//! Owns the HTTP client and the in-flight set. Every dispatch runs on its own
//! tokio task, which pushes a [`RawResponse`] onto a completion queue drained
//! by the facade.
//!
//! ## Supersession
//!
//! Before a request is issued, every in-flight request it supersedes (see
//! [`RequestKind::supersedes`]) is aborted and removed. A response that was
//! already queued for a removed request no longer has an entry, so the
//! correlator discards it.
//!
//! ## Suppressed commits
//!
//! With `suppress_commits` set, commit, void and refund return
//! [`Dispatch::Suppressed`] without building anything. No entry is created
//! and no completion is ever queued for them.

use std::collections::HashMap;
use std::time::Instant;

use levy_core::{BuildError, Credentials, HttpMethod, OrderReference, RequestKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::builder::{OutboundRequest, TaxRequestBuilder};
use crate::error::TransportError;

/// Identifies one dispatched request for its lifetime in the in-flight set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

#[cfg(test)]
impl RequestId {
    pub(crate) fn from_raw(n: u64) -> Self {
        Self(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A completed HTTP exchange, before correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// The request this answers.
    pub id: RequestId,
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    /// Response body (kept for non-2xx responses too).
    pub body: String,
    /// Transport-level failure, rendered.
    pub transport_error: Option<String>,
}

impl RawResponse {
    /// A response carrying only a body, as produced by a successful exchange.
    pub fn ok(id: RequestId, body: impl Into<String>) -> Self {
        Self {
            id,
            status: Some(200),
            body: body.into(),
            transport_error: None,
        }
    }
}

/// Metadata of an in-flight request.
#[derive(Debug)]
pub struct PendingRequest {
    /// Request kind.
    pub kind: RequestKind,
    /// Order the request is about.
    pub order: OrderReference,
    /// Explicit credentials, kept for connection tests only.
    pub credentials: Option<Credentials>,
    /// Request URL.
    pub url: Url,
    /// Serialized request body.
    pub body: Option<String>,
    /// When the request was issued.
    pub dispatched_at: Instant,
    handle: JoinHandle<()>,
}

impl PendingRequest {
    fn abort(&self) {
        self.handle.abort();
    }
}

/// Result of [`TaxServiceTransport::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A commit-class request was dropped because commits are suppressed.
    Suppressed,
    /// The request is in flight.
    Sent(RequestId),
}

/// In-flight bookkeeping and HTTP dispatch.
#[derive(Debug)]
pub struct TaxServiceTransport {
    http: reqwest::Client,
    suppress_commits: bool,
    next_id: u64,
    in_flight: HashMap<RequestId, PendingRequest>,
    completions_tx: mpsc::UnboundedSender<RawResponse>,
    completions_rx: mpsc::UnboundedReceiver<RawResponse>,
}

impl TaxServiceTransport {
    /// Create a transport over a shared HTTP client.
    pub fn new(http: reqwest::Client, suppress_commits: bool) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            http,
            suppress_commits,
            next_id: 1,
            in_flight: HashMap::new(),
            completions_tx,
            completions_rx,
        }
    }

    /// Build and issue a request, superseding older ones for the same target.
    ///
    /// A build failure dispatches nothing and leaves the in-flight set as it
    /// was.
    pub async fn dispatch(
        &mut self,
        builder: &TaxRequestBuilder<'_>,
        kind: RequestKind,
        order: OrderReference,
        payload: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Dispatch, BuildError> {
        if self.suppress_commits && kind.is_commit_class() {
            tracing::debug!(kind = kind.tag(), %order, "commit suppressed");
            return Ok(Dispatch::Suppressed);
        }

        let request = builder.build(kind, &order, payload, credentials).await?;
        self.supersede(kind, &order);

        let id = RequestId(self.next_id);
        self.next_id += 1;
        let dispatched_at = Instant::now();
        let url = request.url.clone();
        let body = request.body.clone();

        tracing::debug!(
            kind = kind.tag(),
            %order,
            request_id = %id,
            url = %url,
            "dispatching tax service request"
        );
        let handle = tokio::spawn(execute(
            self.http.clone(),
            id,
            request,
            self.completions_tx.clone(),
        ));

        self.in_flight.insert(
            id,
            PendingRequest {
                kind,
                order,
                credentials: match kind {
                    RequestKind::Test => credentials.cloned(),
                    _ => None,
                },
                url,
                body,
                dispatched_at,
                handle,
            },
        );
        Ok(Dispatch::Sent(id))
    }

    /// Abort every in-flight request for `order`, whatever its kind.
    ///
    /// Returns how many were canceled.
    pub fn cancel(&mut self, order: &OrderReference) -> usize {
        let ids: Vec<RequestId> = self
            .in_flight
            .iter()
            .filter(|(_, p)| p.order.targets_same_order(order))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.abort(*id, "canceled");
        }
        ids.len()
    }

    /// Remove an entry, handing its metadata to the caller.
    ///
    /// `None` means the request was canceled or already correlated.
    pub fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.in_flight.remove(&id)
    }

    /// Metadata of an in-flight request.
    pub fn pending(&self, id: RequestId) -> Option<&PendingRequest> {
        self.in_flight.get(&id)
    }

    /// Number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Next completed exchange. Never returns `None` while the transport is
    /// alive, since it holds a sender itself.
    pub async fn next_completion(&mut self) -> Option<RawResponse> {
        self.completions_rx.recv().await
    }

    fn supersede(&mut self, kind: RequestKind, order: &OrderReference) {
        let ids: Vec<RequestId> = self
            .in_flight
            .iter()
            .filter(|(_, p)| kind.supersedes(order, p.kind, &p.order))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.abort(id, "superseded");
        }
    }

    fn abort(&mut self, id: RequestId, reason: &'static str) {
        if let Some(pending) = self.in_flight.remove(&id) {
            pending.abort();
            tracing::debug!(
                kind = pending.kind.tag(),
                order = %pending.order,
                request_id = %id,
                reason,
                "aborted in-flight request"
            );
        }
    }
}

impl Drop for TaxServiceTransport {
    fn drop(&mut self) {
        for pending in self.in_flight.values() {
            pending.abort();
        }
    }
}

async fn execute(
    http: reqwest::Client,
    id: RequestId,
    request: OutboundRequest,
    completions: mpsc::UnboundedSender<RawResponse>,
) {
    let endpoint = request.url.to_string();
    let builder = match request.method {
        HttpMethod::Get => http.get(request.url),
        HttpMethod::Post => http.post(request.url).body(request.body.unwrap_or_default()),
    }
    .headers(request.headers);

    let raw = match builder.send().await {
        Err(source) => RawResponse {
            id,
            status: None,
            body: String::new(),
            transport_error: Some(TransportError::Http { endpoint, source }.to_string()),
        },
        Ok(resp) => {
            let status = resp.status();
            match resp.text().await {
                Ok(body) => RawResponse {
                    id,
                    status: Some(status.as_u16()),
                    body,
                    transport_error: (!status.is_success()).then(|| {
                        TransportError::Status {
                            status: status.as_u16(),
                        }
                        .to_string()
                    }),
                },
                Err(source) => RawResponse {
                    id,
                    status: Some(status.as_u16()),
                    body: String::new(),
                    transport_error: Some(TransportError::Body { endpoint, source }.to_string()),
                },
            }
        }
    };

    // The facade may already be gone.
    let _ = completions.send(raw);
}
