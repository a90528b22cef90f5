//! Prometheus metrics for both services.
//!
//! Each service owns a [`Registry`] instead of the process-global default so
//! that tests can build as many apps as they like without duplicate
//! registration errors.
use std::time::Instant;

use actix_web::{
    Error, HttpResponse,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web,
};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub const METRICS_PATH: &str = "/metrics";

const LATENCY_BUCKETS: [f64; 12] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "error" }
}

fn render(registry: &Registry) -> HttpResponse {
    let mut buffer = Vec::new();

    match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            log::error!("Failed to encode metrics: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
    in_progress: IntGauge,
    conversions: IntCounterVec,
    rates_requests: IntCounterVec,
    database_operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status_code"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method", "endpoint"],
        )?;
        let in_progress = IntGauge::new(
            "http_requests_in_progress",
            "Number of HTTP requests currently being processed",
        )?;
        let conversions = IntCounterVec::new(
            Opts::new(
                "currency_conversions_total",
                "Total number of currency conversions performed",
            ),
            &["from_currency", "to_currency", "status"],
        )?;
        let rates_requests = IntCounterVec::new(
            Opts::new("rates_requests_total", "Total number of exchange rates requests"),
            &["endpoint", "status"],
        )?;
        let database_operations = IntCounterVec::new(
            Opts::new("database_operations_total", "Total number of database operations"),
            &["operation", "table", "status"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(in_progress.clone()))?;
        registry.register(Box::new(conversions.clone()))?;
        registry.register(Box::new(rates_requests.clone()))?;
        registry.register(Box::new(database_operations.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            in_progress,
            conversions,
            rates_requests,
            database_operations,
        })
    }

    pub fn record_conversion(&self, from: &str, to: &str, success: bool) {
        self.conversions
            .with_label_values(&[from, to, status_label(success)])
            .inc();
    }

    pub fn record_rates_request(&self, endpoint: &str, success: bool) {
        self.rates_requests
            .with_label_values(&[endpoint, status_label(success)])
            .inc();
    }

    pub fn record_database_operation(&self, operation: &str, table: &str, success: bool) {
        self.database_operations
            .with_label_values(&[operation, table, status_label(success)])
            .inc();
    }

    fn observe_request(&self, method: &str, endpoint: &str, status: u16, started: Instant) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[method, endpoint, status.as_str()])
            .inc();
        self.duration
            .with_label_values(&[method, endpoint])
            .observe(started.elapsed().as_secs_f64());
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Counts and times every request except scrapes of the metrics endpoint.
pub async fn track_requests(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let metrics = req.app_data::<web::Data<Metrics>>().cloned();

    let Some(metrics) = metrics.filter(|_| req.path() != METRICS_PATH) else {
        return next.call(req).await;
    };

    let method = req.method().to_string();
    let endpoint = req
        .match_pattern()
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    metrics.in_progress.inc();
    let result = next.call(req).await;
    metrics.in_progress.dec();

    let status = match &result {
        Ok(res) => res.status().as_u16(),
        Err(e) => e.as_response_error().status_code().as_u16(),
    };
    metrics.observe_request(&method, &endpoint, status, started);

    result
}

pub async fn metrics_handler(metrics: web::Data<Metrics>) -> HttpResponse {
    render(metrics.registry())
}

/// Client-side metrics of the load tester.
#[derive(Clone)]
pub struct LoadTestMetrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl LoadTestMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new(
                "load_test_requests_total",
                "Total number of requests issued by load tests",
            ),
            &["test_id", "status"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "load_test_request_duration_seconds",
                "Latency of load test requests in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["test_id"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
        })
    }

    pub fn record(&self, test_id: &str, success: bool, seconds: f64) {
        self.requests
            .with_label_values(&[test_id, status_label(success)])
            .inc();
        self.duration.with_label_values(&[test_id]).observe(seconds);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub async fn load_test_metrics_handler(metrics: web::Data<LoadTestMetrics>) -> HttpResponse {
    render(metrics.registry())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(registry: &Registry) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_conversion("USD", "EUR", true);
        metrics.record_conversion("USD", "XXX", false);
        metrics.record_rates_request("current_rates", true);
        metrics.record_database_operation("insert", "conversion_history", true);

        let out = text(metrics.registry());
        assert!(out.contains(
            r#"currency_conversions_total{from_currency="USD",status="success",to_currency="EUR"} 1"#
        ));
        assert!(out.contains(r#"status="error""#));
        assert!(out.contains("rates_requests_total"));
        assert!(out.contains("database_operations_total"));
    }

    #[test]
    fn registries_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_rates_request("current_rates", true);
        assert!(!text(b.registry()).contains("rates_requests_total{"));
    }

    #[test]
    fn load_test_metrics_record_latency() {
        let metrics = LoadTestMetrics::new().unwrap();
        metrics.record("default", true, 0.02);
        let out = text(metrics.registry());
        assert!(out.contains(r#"load_test_requests_total{status="success",test_id="default"} 1"#));
        assert!(out.contains("load_test_request_duration_seconds_count"));
    }
}
