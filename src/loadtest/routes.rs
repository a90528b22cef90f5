use actix_web::{HttpResponse, http::header, web};
use chrono::Utc;
use serde_json::json;

use super::{
    CurrencyPatterns, DEFAULT_TEST_ID, LoadTestError, LoadTestManager, LoadTestResponse,
    StartLoadTestRequest,
    report::LoadTestReport,
    scenarios::{Scenario, ScenarioConfig},
};
use crate::metrics::{LoadTestMetrics, METRICS_PATH, load_test_metrics_handler};

pub const SERVICE_NAME: &str = "load-tester";

type Manager = web::Data<LoadTestManager>;
type Result<T> = std::result::Result<T, LoadTestError>;

/// An empty body means "use the defaults".
fn start_request(body: &[u8]) -> Result<StartLoadTestRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StartLoadTestRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| LoadTestError::InvalidConfig(e.to_string()))
}

pub fn configure(
    manager: Manager,
    metrics: web::Data<LoadTestMetrics>,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(manager)
            .app_data(metrics)
            .route("/health", web::get().to(health))
            .route(METRICS_PATH, web::get().to(load_test_metrics_handler))
            .service(
                web::scope("/api/load-test")
                    .route("/start", web::post().to(start))
                    .route("/ramp", web::post().to(ramp))
                    .route("/stop", web::post().to(stop))
                    .route("/status", web::get().to(status))
                    .route("/report", web::get().to(report))
                    .route("/report/markdown", web::get().to(report_markdown))
                    .route("/patterns", web::get().to(patterns))
                    .route("/scenarios", web::get().to(list_scenarios))
                    .route("/scenarios/{name}", web::get().to(scenario))
                    .route("/scenarios/{name}/start", web::post().to(start_scenario))
                    .route("/scenarios/{name}/ramp", web::post().to(ramp_scenario))
                    .route("/scenarios/{name}/report", web::get().to(scenario_report))
                    .route("/concurrent/stop-all", web::post().to(stop_all))
                    .route("/concurrent/status", web::get().to(all_status))
                    .route("/concurrent/active", web::get().to(active))
                    .route("/concurrent/cleanup", web::delete().to(cleanup))
                    .route("/concurrent/{id}/start", web::post().to(start_concurrent))
                    .route("/concurrent/{id}/stop", web::post().to(stop_concurrent))
                    .route("/concurrent/{id}/status", web::get().to(concurrent_status)),
            );
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": SERVICE_NAME,
    }))
}

async fn start(manager: Manager, body: web::Bytes) -> Result<web::Json<LoadTestResponse>> {
    let request = start_request(&body)?;
    let response = manager.start_or_ramp(DEFAULT_TEST_ID, request.config).await?;
    Ok(web::Json(response))
}

async fn ramp(manager: Manager, body: web::Bytes) -> Result<web::Json<LoadTestResponse>> {
    let request = start_request(&body)?;
    let response = manager.ramp(DEFAULT_TEST_ID, request.config).await?;
    Ok(web::Json(response))
}

/// Stopping a test that never ran reports it as idle.
async fn stop(manager: Manager) -> Result<web::Json<LoadTestResponse>> {
    match manager.stop(DEFAULT_TEST_ID).await {
        Err(LoadTestError::NotFound(_)) => Ok(web::Json(LoadTestResponse::idle(DEFAULT_TEST_ID))),
        result => result.map(web::Json),
    }
}

async fn status(manager: Manager) -> web::Json<LoadTestResponse> {
    web::Json(manager.status_or_idle(DEFAULT_TEST_ID).await)
}

async fn report(manager: Manager) -> web::Json<LoadTestReport> {
    let response = manager.status_or_idle(DEFAULT_TEST_ID).await;
    web::Json(LoadTestReport::new(&response, None, Utc::now()))
}

async fn report_markdown(manager: Manager) -> HttpResponse {
    let response = manager.status_or_idle(DEFAULT_TEST_ID).await;
    let report = LoadTestReport::new(&response, None, Utc::now());

    HttpResponse::Ok()
        .content_type("text/markdown; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=load_test_report.md",
        ))
        .body(report.to_markdown())
}

/// Catalogue pairs with their share of generated traffic in percent.
async fn patterns() -> HttpResponse {
    HttpResponse::Ok().json(CurrencyPatterns::pair_distribution())
}

async fn list_scenarios() -> HttpResponse {
    HttpResponse::Ok().json(Scenario::list())
}

async fn scenario(name: web::Path<String>) -> Result<web::Json<ScenarioConfig>> {
    let scenario: Scenario = name.parse()?;
    Ok(web::Json(scenario.config()))
}

async fn start_scenario(
    manager: Manager,
    name: web::Path<String>,
) -> Result<web::Json<LoadTestResponse>> {
    let scenario: Scenario = name.parse()?;
    log::info!("Starting {scenario} scenario");

    let response = manager
        .start_or_ramp(DEFAULT_TEST_ID, Some(scenario.config().config))
        .await?;
    Ok(web::Json(response))
}

async fn ramp_scenario(
    manager: Manager,
    name: web::Path<String>,
) -> Result<web::Json<LoadTestResponse>> {
    let scenario: Scenario = name.parse()?;

    let response = manager
        .ramp(DEFAULT_TEST_ID, Some(scenario.config().config))
        .await?;
    Ok(web::Json(response))
}

async fn scenario_report(
    manager: Manager,
    name: web::Path<String>,
) -> Result<web::Json<LoadTestReport>> {
    let scenario: Scenario = name.parse()?;
    let response = manager.status_or_idle(DEFAULT_TEST_ID).await;

    Ok(web::Json(LoadTestReport::new(
        &response,
        Some(scenario.config().name),
        Utc::now(),
    )))
}

async fn start_concurrent(
    manager: Manager,
    id: web::Path<String>,
    body: web::Bytes,
) -> Result<web::Json<LoadTestResponse>> {
    let request = start_request(&body)?;
    let response = manager.start(&id, request.config).await?;
    Ok(web::Json(response))
}

async fn stop_concurrent(
    manager: Manager,
    id: web::Path<String>,
) -> Result<web::Json<LoadTestResponse>> {
    Ok(web::Json(manager.stop(&id).await?))
}

async fn stop_all(manager: Manager) -> HttpResponse {
    HttpResponse::Ok().json(manager.stop_all().await)
}

async fn concurrent_status(
    manager: Manager,
    id: web::Path<String>,
) -> Result<web::Json<LoadTestResponse>> {
    Ok(web::Json(manager.status(&id).await?))
}

async fn all_status(manager: Manager) -> HttpResponse {
    HttpResponse::Ok().json(manager.all_status().await)
}

async fn active(manager: Manager) -> HttpResponse {
    HttpResponse::Ok().json(manager.active_ids().await)
}

async fn cleanup(manager: Manager) -> HttpResponse {
    let removed = manager.cleanup().await;
    HttpResponse::Ok().json(json!({ "status": "Cleanup completed", "removed": removed }))
}
