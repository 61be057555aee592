//! # Postgres Data Store
//!
//! Talks to the ERP database through server-side functions the ERP schema
//! already provides. levy ships no migrations: the schema is owned by the ERP.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | `taxservice_target(kind, order_type, order_id, order_number, account, key, base_url)` | URL + headers (jsonb) for an outbound request |
//! | `taxservice_payload(request, order_type, order_id, order_number, record, refund_date)` | JSON document for calculate/post/void/refund |
//! | `savetax(order_type, order_id, response jsonb)` | store a calculation response, return the tax total |
//!
//! The `calculatetax` notification channel is served by a [`PgListener`]
//! running on its own task and forwarded over an mpsc channel.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use levy_core::{
    CalculateTaxNotice, OrderReference, OrderType, PayloadRequest, RequestTarget, ServiceConfig,
    StoreError, TargetQuery, TaxStore, CALCULATE_TAX_CHANNEL,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio::sync::mpsc;
use url::Url;

use crate::metrics::{service_config_from_metrics, SERVICE_METRICS};

/// Buffered notices before the listener task applies backpressure.
const NOTICE_BUFFER: usize = 64;

/// Connect to the ERP database.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");
    Ok(pool)
}

/// [`TaxStore`] backed by the ERP's Postgres database.
#[derive(Debug, Clone)]
pub struct PgTaxStore {
    pool: PgPool,
}

impl PgTaxStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and wrap.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        init_pool(url).await.map(Self::new).map_err(db_error)
    }
}

#[async_trait]
impl TaxStore for PgTaxStore {
    async fn load_service_config(&self) -> Result<ServiceConfig, StoreError> {
        let names: Vec<String> = SERVICE_METRICS.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, MetricRow>(
            "SELECT metric_name, metric_value FROM metric WHERE metric_name = ANY($1)",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let metrics: HashMap<String, String> = rows
            .into_iter()
            .filter_map(|r| r.metric_value.map(|v| (r.metric_name, v)))
            .collect();
        service_config_from_metrics(&metrics)
    }

    async fn resolve_target(&self, query: TargetQuery<'_>) -> Result<RequestTarget, StoreError> {
        let row = sqlx::query_as::<_, TargetRow>(
            "SELECT url, headers FROM taxservice_target($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(query.kind.tag())
        .bind(order_type_tag(query.order))
        .bind(query.order.order_id)
        .bind(query.order.order_number.as_deref())
        .bind(&query.credentials.account)
        .bind(&query.credentials.key)
        .bind(query.credentials.base_url.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| StoreError::NotFound {
            what: format!("{} request target for {}", query.kind, query.order),
        })?;

        row.into_target()
    }

    async fn resolve_payload(&self, request: &PayloadRequest) -> Result<String, StoreError> {
        let order = request.order();
        let (record, refund_date): (bool, Option<NaiveDate>) = match request {
            PayloadRequest::Calculate { record, .. } => (*record, None),
            PayloadRequest::Refund { refund_date, .. } => (false, Some(*refund_date)),
            PayloadRequest::Post { .. } | PayloadRequest::Void { .. } => (false, None),
        };

        let payload: Option<String> = sqlx::query_scalar(
            "SELECT taxservice_payload($1, $2, $3, $4, $5, $6)::text AS payload",
        )
        .bind(request.tag())
        .bind(order_type_tag(&order))
        .bind(order.order_id)
        .bind(order.order_number.as_deref())
        .bind(record)
        .bind(refund_date)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        payload.ok_or_else(|| StoreError::NotFound {
            what: format!("{} payload for {order}", request.tag()),
        })
    }

    async fn save_tax(
        &self,
        order: &OrderReference,
        response: &str,
    ) -> Result<Decimal, StoreError> {
        let total: Option<Decimal> =
            sqlx::query_scalar("SELECT savetax($1, $2, $3::jsonb) AS total")
                .bind(order_type_tag(order))
                .bind(order.order_id)
                .bind(response)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;

        total.ok_or_else(|| StoreError::NotFound {
            what: format!("tax total for {order}"),
        })
    }

    async fn subscribe_calculate_tax(
        &self,
    ) -> Result<mpsc::Receiver<CalculateTaxNotice>, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        listener
            .listen(CALCULATE_TAX_CHANNEL)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        tracing::info!(channel = CALCULATE_TAX_CHANNEL, "listening for tax notifications");

        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!(
                            channel = CALCULATE_TAX_CHANNEL,
                            "notification listener stopped: {e}"
                        );
                        break;
                    }
                };
                match notification.payload().parse::<CalculateTaxNotice>() {
                    Ok(notice) => {
                        if tx.send(notice).await.is_err() {
                            tracing::debug!("notice receiver dropped, stopping listener");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("ignoring notification: {e}"),
                }
            }
        });

        Ok(rx)
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn order_type_tag(order: &OrderReference) -> Option<&str> {
    order.order_type.as_ref().map(OrderType::as_str)
}

/// Internal row type for metric lookups.
#[derive(sqlx::FromRow)]
struct MetricRow {
    metric_name: String,
    metric_value: Option<String>,
}

/// Internal row type for request-target lookups.
#[derive(sqlx::FromRow)]
struct TargetRow {
    url: Option<String>,
    headers: Option<serde_json::Value>,
}

impl TargetRow {
    fn into_target(self) -> Result<RequestTarget, StoreError> {
        let raw = self.url.ok_or_else(|| StoreError::NotFound {
            what: "request url".into(),
        })?;
        let url = Url::parse(&raw).map_err(|e| StoreError::Decode {
            what: format!("request url \"{raw}\""),
            reason: e.to_string(),
        })?;
        Ok(RequestTarget {
            url,
            headers: headers_from_json(self.headers)?,
        })
    }
}

/// Decode a jsonb header object. `NULL` means no extra headers.
fn headers_from_json(
    value: Option<serde_json::Value>,
) -> Result<BTreeMap<String, String>, StoreError> {
    let decode_err = |reason: String| StoreError::Decode {
        what: "request headers".into(),
        reason,
    };
    match value {
        None | Some(serde_json::Value::Null) => Ok(BTreeMap::new()),
        Some(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(name, v)| match v {
                serde_json::Value::String(s) => Ok((name, s)),
                other => Err(decode_err(format!("header {name} is not a string: {other}"))),
            })
            .collect(),
        Some(other) => Err(decode_err(format!("expected an object, got {other}"))),
    }
}
