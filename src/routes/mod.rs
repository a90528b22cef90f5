use std::sync::Arc;

use actix_web::{
    HttpRequest, error,
    web::{self, ServiceConfig},
};

use crate::{
    auth::JwtKeys, error::ApiError, exchange_rate::RateTable, metrics::Metrics, store::Store,
};

pub mod conversion;
pub mod dashboard;
pub mod debug;
pub mod health;
pub mod rates;

pub const SERVICE_NAME: &str = "currency-conversion-api";

/// Shared by every handler of the conversion API.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub rates: Arc<RateTable>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            rates: Arc::new(RateTable::simulated()),
        }
    }
}

/// Everything the routes need, wrapped once so workers share one copy.
#[derive(Clone)]
pub struct AppData {
    pub state: web::Data<AppState>,
    pub metrics: web::Data<Metrics>,
    pub keys: web::Data<JwtKeys>,
}

impl AppData {
    pub fn new(state: AppState, metrics: Metrics, keys: JwtKeys) -> Self {
        Self {
            state: web::Data::new(state),
            metrics: web::Data::new(metrics),
            keys: web::Data::new(keys),
        }
    }
}

pub(crate) fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<T, ApiError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ApiError::InvalidRequest(format!(
            "{name} must be between {min} and {max}, got {value}"
        )));
    }

    Ok(value)
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidRequest(format!("Malformed request body: {err}")).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidRequest(format!("Invalid query parameters: {err}")).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::InvalidRequest(format!("Invalid path: {err}")).into()
}

pub fn configure(data: AppData) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        cfg.app_data(data.state)
            .app_data(data.metrics)
            .app_data(data.keys)
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::QueryConfig::default().error_handler(query_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            .route("/", web::get().to(dashboard::dashboard))
            .route("/dashboard", web::get().to(dashboard::dashboard))
            .route("/api", web::get().to(health::api_info))
            .route("/health", web::get().to(health::health))
            .route("/health/detailed", web::get().to(health::detailed_health))
            .route(
                crate::metrics::METRICS_PATH,
                web::get().to(crate::metrics::metrics_handler),
            )
            .service(
                web::scope("/api/v1")
                    .route("/convert", web::post().to(conversion::convert))
                    .route("/rates", web::get().to(rates::current_rates))
                    .route("/rates/history", web::get().to(rates::rates_history))
                    .route(
                        "/rates/statistics/{currency}",
                        web::get().to(rates::rate_statistics),
                    ),
            )
            .service(
                web::scope("/api/debug")
                    .route("/user-activity", web::get().to(debug::user_activity_handler))
                    .route(
                        "/request-patterns",
                        web::get().to(debug::request_patterns_handler),
                    ),
            );
    }
}
