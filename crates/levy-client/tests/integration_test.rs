//! # Integration Tests for the AvaTax Facade
//!
//! Drives [`AvalaraIntegration`] against wiremock servers with an in-memory
//! store: supersession, suppressed commits, error extraction, the composite
//! operations, persistence, the audit log and the `calculatetax` listener.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use levy_client::builder::basic_auth;
use levy_client::{
    connect, AvalaraIntegration, BusyIndicator, ClientConfig, ListenMode, TaxService,
    INVALID_AUTHENTICATION,
};
use levy_core::{
    Credentials, OrderReference, OrderType, PayloadRequest, RequestKind, ServiceConfig,
    StoreError, TaxEvent, TaxProvider, TaxResult,
};
use levy_store::MemoryTaxStore;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::broadcast;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREATE_PATH: &str = "/api/v2/transactions/createoradjust";

// ── Helpers ──────────────────────────────────────────────────────────────

fn credentials(server: &MockServer, account: &str) -> Credentials {
    Credentials {
        account: account.into(),
        key: "license-key".into(),
        base_url: Url::parse(&server.uri()).unwrap(),
        company: "ACME".into(),
    }
}

fn service(server: &MockServer) -> ServiceConfig {
    ServiceConfig {
        provider: TaxProvider::Avalara,
        server_version: "4.12.0".into(),
        credentials: Some(credentials(server, "1100012345")),
        ..ServiceConfig::default()
    }
}

fn integration(
    store: &Arc<MemoryTaxStore>,
    service: ServiceConfig,
) -> AvalaraIntegration<MemoryTaxStore> {
    AvalaraIntegration::new(store.clone(), service, ClientConfig::local_mock()).unwrap()
}

fn cm() -> OrderType {
    OrderType::new("CM").unwrap()
}

fn cm42() -> OrderReference {
    OrderReference::new(cm(), 42)
}

fn calculate(order: OrderReference, record: bool) -> PayloadRequest {
    PayloadRequest::Calculate { order, record }
}

fn drain(events: &mut broadcast::Receiver<TaxEvent>) -> Vec<TaxEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ── Calculation ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calculate_tax_persists_and_reports_amount() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    store.set_payload(
        &calculate(cm42(), false),
        r#"{ "code": "CM-42", "lines": [] }"#,
    );

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .and(header("x-avalara-client", "levy; 4.12.0; REST; v2; localhost"))
        .and(header(
            "authorization",
            basic_auth(&credentials(&server, "1100012345")).as_str(),
        ))
        .and(body_json(json!({"code": "CM-42", "lines": []})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 12.34}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.calculate_tax(cm(), 42, false).await;
    assert_eq!(svc.pending_requests(), 1);
    svc.wait().await;

    assert_eq!(svc.pending_requests(), 0);
    assert_eq!(svc.error(), "");
    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::TaxCalculated {
            order: cm42(),
            result: TaxResult::success(Decimal::new(1234, 2)),
        }]
    );
    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].order, cm42());
    assert_eq!(saved[0].response, r#"{"totalTax": 12.34}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newer_calculation_supersedes_older_for_same_order() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());

    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .and(body_json(json!({"code": "CM-42", "rev": 1})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"totalTax": 1.00}"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .and(body_json(json!({"code": "CM-42", "rev": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 2.00}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();

    store.set_payload(&calculate(cm42(), false), r#"{"code":"CM-42","rev":1}"#);
    svc.calculate_tax(cm(), 42, false).await;
    store.set_payload(&calculate(cm42(), false), r#"{"code":"CM-42","rev":2}"#);
    svc.calculate_tax(cm(), 42, false).await;
    assert_eq!(svc.pending_requests(), 1);
    svc.wait().await;

    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::TaxCalculated {
            order: cm42(),
            result: TaxResult::success(Decimal::new(200, 2)),
        }]
    );
    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].total, Decimal::new(200, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calculations_for_different_orders_both_complete() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 4}"#))
        .expect(2)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    svc.calculate_tax(cm(), 42, false).await;
    svc.calculate_tax(cm(), 43, false).await;
    assert_eq!(svc.pending_requests(), 2);
    svc.wait().await;

    let mut ids: Vec<i64> = store.saved().iter().map(|s| s.order.order_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![42, 43]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn payload_failure_is_reported_without_dispatch() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    store.fail_payloads(Some(StoreError::NotFound {
        what: "cmhead 42".into(),
    }));
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.calculate_tax(cm(), 42, false).await;
    svc.wait().await;

    assert_eq!(svc.pending_requests(), 0);
    assert!(svc.error().contains("resolving calculate payload for CM#42"));
    assert!(matches!(
        drain(&mut events).as_slice(),
        [TaxEvent::StoreFailure { .. }]
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persistence_failure_still_completes_with_empty_amount() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    store.fail_saves(Some(StoreError::Database("deadlock detected".into())));
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 9}"#))
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.calculate_tax(cm(), 42, false).await;
    svc.wait().await;

    assert!(svc.error().contains("deadlock detected"));
    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        TaxEvent::TaxCalculated {
            order: cm42(),
            result: TaxResult::default(),
        }
    );
}

// ── Connection test ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_connection_test_supersedes_first() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    let first = credentials(&server, "first");
    let second = credentials(&server, "second");

    Mock::given(method("GET"))
        .and(path("/api/v2/utilities/ping"))
        .and(header("authorization", basic_auth(&first).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"authenticated": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/utilities/ping"))
        .and(header("authorization", basic_auth(&second).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"authenticated": false})))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.test(first).await;
    svc.test(second).await;
    svc.wait().await;

    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::ConnectionTested {
            error: INVALID_AUTHENTICATION.into(),
        }]
    );
    assert_eq!(svc.error(), INVALID_AUTHENTICATION);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tax_codes_are_delivered_as_documents() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    let codes = json!({"value": [{"taxCode": "P0000000", "description": "Tangible personal property"}]});
    Mock::given(method("GET"))
        .and(path("/api/v2/definitions/taxcodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(codes.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.get_tax_codes().await;
    svc.wait().await;

    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::TaxCodesFetched {
            codes,
            error: String::new(),
        }]
    );
}

// ── Composite operations ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_records_then_commits() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 3.50}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/companies/ACME/transactions/CM-42/commit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Committed"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    assert!(svc.commit(cm(), 42).await);

    let events = drain(&mut events);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], TaxEvent::TaxCalculated { .. }));
    assert_eq!(
        events[1],
        TaxEvent::TransactionFinished {
            kind: RequestKind::CommitTransaction,
            order: cm42(),
            error: String::new(),
        }
    );
    let requests = store.payload_requests();
    assert_eq!(requests[0], calculate(cm42(), true));
    assert_eq!(requests[1], PayloadRequest::Post { order: cm42() });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_ignores_failures_of_unrelated_requests() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("GET"))
        .and(path("/api/v2/definitions/taxcodes"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 3.50}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/companies/ACME/transactions/CM-42/commit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Committed"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.get_tax_codes().await;
    assert!(svc.commit(cm(), 42).await);
    assert_eq!(svc.error(), "");
    assert_eq!(store.saved().len(), 1);

    // The lookup still completes and reports its own failure.
    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        TaxEvent::TaxCodesFetched { error, .. } if error == "HTTP 500"
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_stops_when_calculation_fails() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "X",
                "message": "Y",
                "details": [{"description": "Z"}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/commit$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    assert!(!svc.commit(cm(), 42).await);

    let error = svc.error();
    assert!(error.contains('X'));
    assert!(error.contains('Y'));
    assert!(error.contains('Z'));
    assert!(store.saved().is_empty());
    assert_eq!(store.payload_requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn suppressed_commits_never_reach_the_service() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 1}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/(commit|void|refund)$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut svc = integration(
        &store,
        ServiceConfig {
            suppress_commits: true,
            ..service(&server)
        },
    );
    let mut events = svc.subscribe();

    assert!(svc.commit(cm(), 42).await);
    assert!(svc.cancel(cm(), 42, "CM-10042").await);
    assert!(svc
        .refund(77, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .await);
    assert_eq!(svc.pending_requests(), 0);

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TaxEvent::TaxCalculated { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_aborts_pending_calculation_and_voids() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"totalTax": 1}"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/v2/companies/ACME/transactions/CM-.+/void$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "Cancelled"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let mut events = svc.subscribe();
    svc.calculate_tax(cm(), 42, false).await;
    assert!(svc.cancel(cm(), 42, "CM 10042").await);
    assert_eq!(svc.pending_requests(), 0);

    let order = cm42().with_number("CM 10042");
    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::TransactionFinished {
            kind: RequestKind::VoidTransaction,
            order,
            error: String::new(),
        }]
    );
    assert!(store.saved().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refund_reports_transport_error() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("POST"))
        .and(path("/api/v2/companies/ACME/transactions/INV-77/refund"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = integration(&store, service(&server));
    let refunded = svc
        .refund(77, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap())
        .await;

    assert!(!refunded);
    assert_eq!(svc.error(), "HTTP 500");
}

// ── Audit log and busy indicator ─────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audit_log_records_each_exchange() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    store.set_payload(&calculate(cm42(), false), r#"{"code":"CM-42"}"#);
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 12.34}"#))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("avatax.log");
    let mut svc = integration(
        &store,
        ServiceConfig {
            logging_enabled: true,
            log_file_path: Some(log_path.clone()),
            ..service(&server)
        },
    );
    svc.calculate_tax(cm(), 42, false).await;
    svc.wait().await;

    let text = std::fs::read_to_string(&log_path).unwrap();
    assert!(text.contains("Create Or Adjust Transaction (elapsed "));
    assert!(text.contains("\"code\": \"CM-42\""));
    assert!(text.contains("\"totalTax\": 12.34"));
}

struct Recorder(Arc<Mutex<Vec<bool>>>);

impl BusyIndicator for Recorder {
    fn set_busy(&mut self, busy: bool) {
        self.0.lock().unwrap().push(busy);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_drives_busy_indicator_only_when_pending() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("GET"))
        .and(path("/api/v2/definitions/entityusecodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut svc = integration(&store, service(&server))
        .with_busy_indicator(Box::new(Recorder(log.clone())));

    svc.wait().await;
    assert!(log.lock().unwrap().is_empty());

    svc.get_tax_exempt_categories(None).await;
    svc.wait().await;
    assert_eq!(*log.lock().unwrap(), vec![true, false]);

    svc.get_tax_exempt_categories(None).await;
    svc.wait().await;
    assert_eq!(*log.lock().unwrap(), vec![true, false, true, false]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn interrupted_wait_keeps_busy_indicator() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::default());
    Mock::given(method("GET"))
        .and(path("/api/v2/definitions/entityusecodes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"value": []}))
                .set_delay(Duration::from_secs(1)),
        )
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut svc = integration(&store, service(&server))
        .with_busy_indicator(Box::new(Recorder(log.clone())));

    svc.get_tax_exempt_categories(None).await;
    assert!(tokio::time::timeout(Duration::from_millis(50), svc.wait())
        .await
        .is_err());
    assert_eq!(*log.lock().unwrap(), vec![true, false]);
    assert_eq!(svc.pending_requests(), 1);

    svc.wait().await;
    assert_eq!(svc.pending_requests(), 0);
    assert_eq!(*log.lock().unwrap(), vec![true, false, true, false]);
}

// ── Selection and listening ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listener_calculates_on_notice() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTaxStore::new(service(&server)));
    Mock::given(method("POST"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"totalTax": 6.25}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut svc = connect(store.clone(), ClientConfig::local_mock(), ListenMode::Listening)
        .await
        .unwrap();
    assert!(store.notify("CM,42,t".parse().unwrap()));
    store.close_notifications();

    tokio::time::timeout(Duration::from_secs(10), svc.run_listener())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(store.payload_requests(), vec![calculate(cm42(), true)]);
    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].total, Decimal::new(625, 2));
}

#[tokio::test]
async fn unconfigured_provider_selects_null_integration() {
    let store = Arc::new(MemoryTaxStore::new(ServiceConfig::default()));
    let mut svc = connect(store.clone(), ClientConfig::local_mock(), ListenMode::Direct)
        .await
        .unwrap();
    let mut events = svc.subscribe();

    svc.calculate_tax(cm(), 42, true).await;
    svc.wait().await;

    assert_eq!(
        drain(&mut events),
        vec![TaxEvent::TaxCalculated {
            order: cm42(),
            result: TaxResult::success(Decimal::ZERO),
        }]
    );
    assert!(store.payload_requests().is_empty());
}
