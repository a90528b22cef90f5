use std::sync::Arc;

use actix_web::{App, http::StatusCode, middleware, test};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use uuid::Uuid;
use valut::{
    auth::JwtKeys,
    exchange_rate::RateTable,
    history::{self, RateSample},
    metrics::{Metrics, track_requests},
    routes::{self, AppData, AppState},
    store::{
        ConversionRecord, HistoryQuery, NewConversion, RateRecord, Store, StoreError,
        StoreResult, memory::MemoryStore,
    },
};

const SECRET: &str = "integration-test-secret-key";

fn app_data(store: Arc<dyn Store>) -> AppData {
    AppData::new(
        AppState::new(store),
        Metrics::new().unwrap(),
        JwtKeys::new(SECRET),
    )
}

fn bearer(account: &str, user: &str) -> (&'static str, String) {
    let token = JwtKeys::new(SECRET).generate_token(account, user).unwrap();
    ("Authorization", format!("Bearer {token}"))
}

fn decimal(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

macro_rules! app {
    ($store:expr) => {
        test::init_service(App::new().configure(routes::configure(app_data($store)))).await
    };
}

#[actix_web::test]
async fn converts_for_authenticated_user() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .insert_header(bearer("acct-1", "user-1"))
        .set_json(json!({"amount": "100", "from_currency": "usd", "to_currency": "EUR"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["from_currency"], "USD");
    assert_eq!(body["to_currency"], "EUR");
    assert_eq!(decimal(&body["amount"]), Decimal::ONE_HUNDRED);
    assert_eq!(decimal(&body["exchange_rate"]), Decimal::new(8523, 4));
    assert_eq!(decimal(&body["converted_amount"]), Decimal::new(8523, 2));
    assert!(body["conversion_id"].is_string());
    let request_id = Uuid::parse_str(body["request_id"].as_str().unwrap()).unwrap();
    assert_eq!(request_id.get_version_num(), 7);

    let req = test::TestRequest::get()
        .uri("/api/debug/user-activity?minutes=5")
        .insert_header(bearer("acct-2", "user-2"))
        .to_request();
    let activity: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(activity["summary"]["total_requests"], 1);
    assert_eq!(activity["users"][0]["user_id"], "user-1");
    assert_eq!(activity["users"][0]["account_id"], "acct-1");
}

#[actix_web::test]
async fn rejects_missing_token() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .set_json(json!({"amount": 10, "from_currency": "USD", "to_currency": "EUR"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[actix_web::test]
async fn reports_invalid_input() {
    let app = app!(Arc::new(MemoryStore::new()));
    let request_id = "0190b5a4-1c2d-7e3f-8a9b-0c1d2e3f4a5b";

    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .insert_header(bearer("a", "u"))
        .set_json(json!({
            "amount": 10,
            "from_currency": "XXX",
            "to_currency": "EUR",
            "request_id": request_id,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_CURRENCY");
    assert_eq!(body["error"]["request_id"], request_id);
    assert!(
        body["error"]["details"]["supported_currencies"]
            .as_str()
            .unwrap()
            .contains("USD")
    );

    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .insert_header(bearer("a", "u"))
        .set_json(json!({"amount": "-5", "from_currency": "USD", "to_currency": "EUR"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    // Beyond what the history table can store.
    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .insert_header(bearer("a", "u"))
        .set_json(json!({"amount": "10000000000000", "from_currency": "USD", "to_currency": "EUR"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let req = test::TestRequest::post()
        .uri("/api/v1/convert")
        .insert_header(bearer("a", "u"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[actix_web::test]
async fn debug_endpoints_require_token() {
    let app = app!(Arc::new(MemoryStore::new()));

    for uri in ["/api/debug/user-activity", "/api/debug/request-patterns"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");

        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(bearer("a", "u"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }
}

#[actix_web::test]
async fn unknown_codes_share_one_metric_label() {
    let app = app!(Arc::new(MemoryStore::new()));

    for code in ["XXX", "NOT-A-CURRENCY", "zzzzzzzzzzzzzzzz"] {
        let req = test::TestRequest::post()
            .uri("/api/v1/convert")
            .insert_header(bearer("a", "u"))
            .set_json(json!({"amount": 10, "from_currency": code, "to_currency": "eur"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let text = test::call_and_read_body(&app, req).await;
    let text = std::str::from_utf8(&text).unwrap();
    assert!(text.contains(
        r#"currency_conversions_total{from_currency="invalid",status="error",to_currency="EUR"} 3"#
    ));
    assert!(!text.contains("XXX"));
    assert!(!text.contains("NOT-A-CURRENCY"));
}

#[actix_web::test]
async fn tracks_requests_by_route_pattern() {
    let app = test::init_service(
        App::new()
            .wrap(middleware::from_fn(track_requests))
            .configure(routes::configure(app_data(Arc::new(MemoryStore::new())))),
    )
    .await;

    for uri in ["/api/v1/rates", "/api/v1/rates/statistics/GBP", "/metrics"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        test::call_service(&app, req).await;
    }
    let req = test::TestRequest::get().uri("/api/v1/rates/statistics/XYZ").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let text = test::call_and_read_body(&app, req).await;
    let text = std::str::from_utf8(&text).unwrap();

    assert!(text.contains(
        r#"http_requests_total{endpoint="/api/v1/rates",method="GET",status_code="200"} 1"#
    ));
    assert!(text.contains(
        r#"http_requests_total{endpoint="/api/v1/rates/statistics/{currency}",method="GET",status_code="200"} 1"#
    ));
    assert!(text.contains(
        r#"http_requests_total{endpoint="/api/v1/rates/statistics/{currency}",method="GET",status_code="400"} 1"#
    ));
    assert!(text.contains(
        r#"http_request_duration_seconds_count{endpoint="/api/v1/rates",method="GET"} 1"#
    ));
    assert!(text.contains("http_requests_in_progress 0"));
    assert!(!text.contains(r#"endpoint="/metrics""#));
}

/// A store whose database is unreachable.
struct DownStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl Store for DownStore {
    async fn insert_conversion(&self, _: &NewConversion) -> StoreResult<ConversionRecord> {
        down()
    }

    async fn insert_rates(&self, _: &[RateSample]) -> StoreResult<u64> {
        down()
    }

    async fn rate_history(&self, _: &HistoryQuery) -> StoreResult<Vec<RateRecord>> {
        down()
    }

    async fn conversions_since(&self, _: DateTime<Utc>) -> StoreResult<Vec<ConversionRecord>> {
        down()
    }

    async fn ping(&self) -> StoreResult<()> {
        down()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[actix_web::test]
async fn detailed_health_reports_unreachable_store() {
    let app = app!(Arc::new(DownStore));

    let req = test::TestRequest::get().uri("/health/detailed").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "unhealthy");
    assert!(body["checks"]["database"].as_str().unwrap().starts_with("unhealthy"));
    assert_eq!(body["checks"]["storage_backend"], "postgres");

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn serves_current_rates() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::get().uri("/api/v1/rates").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["base_currency"], "USD");
    assert_eq!(
        body["rates"].as_array().unwrap().len(),
        RateTable::simulated().len()
    );
}

#[actix_web::test]
async fn serves_rate_history_and_statistics() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let table = RateTable::simulated();
    let now = Utc::now();
    for hours in [1, 2, 3] {
        store
            .insert_rates(&history::snapshot(&table, now - Duration::hours(hours)))
            .await
            .unwrap();
    }
    let app = app!(store);

    let req = test::TestRequest::get()
        .uri("/api/v1/rates/history?currency=eur&days=1")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["currency"], "EUR");
    assert_eq!(body["total_records"], 3);
    assert!(body["rates"].as_array().unwrap().iter().all(|r| r["currency"] == "EUR"));

    let req = test::TestRequest::get()
        .uri("/api/v1/rates/history?days=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/v1/rates/statistics/GBP?days=7")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["currency"], "GBP");
    assert_eq!(body["statistics"]["total_records"], 3);
    assert_eq!(body["statistics"]["volatility"], 0.0);

    let req = test::TestRequest::get()
        .uri("/api/v1/rates/statistics/XYZ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn health_endpoints() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], routes::SERVICE_NAME);

    let req = test::TestRequest::get().uri("/health/detailed").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["checks"]["database"], "healthy");
    assert_eq!(body["checks"]["storage_backend"], "memory");

    let req = test::TestRequest::get().uri("/api").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[actix_web::test]
async fn dashboard_and_metrics_render() {
    let app = app!(Arc::new(MemoryStore::new()));

    let req = test::TestRequest::get().uri("/dashboard").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = test::read_body(resp).await;
    assert!(std::str::from_utf8(&html).unwrap().contains("EUR"));

    let req = test::TestRequest::get().uri("/api/v1/rates").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let text = test::call_and_read_body(&app, req).await;
    let text = std::str::from_utf8(&text).unwrap();
    assert!(text.contains("rates_requests_total"));
}
