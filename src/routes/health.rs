use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::{AppState, SERVICE_NAME};
use crate::metrics::METRICS_PATH;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub service: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<BTreeMap<&'static str, String>>,
}

impl HealthResponse {
    fn healthy() -> Self {
        Self {
            status: "healthy",
            timestamp: Utc::now().to_rfc3339(),
            service: SERVICE_NAME,
            checks: None,
        }
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse::healthy())
}

pub async fn detailed_health(state: web::Data<AppState>) -> HttpResponse {
    let mut response = HealthResponse::healthy();
    let mut checks = BTreeMap::new();

    let healthy = match state.store.ping().await {
        Ok(()) => {
            checks.insert("database", "healthy".to_string());
            true
        }
        Err(e) => {
            log::error!("Database health check failed: {e}");
            checks.insert("database", format!("unhealthy: {e}"));
            false
        }
    };
    checks.insert("storage_backend", state.store.backend().to_string());
    response.checks = Some(checks);

    if healthy {
        HttpResponse::Ok().json(response)
    } else {
        response.status = "unhealthy";
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn api_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Currency Conversion API",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "endpoints": {
            "convert": "/api/v1/convert",
            "rates": "/api/v1/rates",
            "rates_history": "/api/v1/rates/history",
            "rates_statistics": "/api/v1/rates/statistics/{currency}",
            "user_activity": "/api/debug/user-activity",
            "request_patterns": "/api/debug/request-patterns",
            "dashboard": "/dashboard",
            "metrics": METRICS_PATH,
        },
    }))
}
