//! Load generation against the conversion API.
//!
//! A [`LoadTestManager`] owns any number of named tests, each driven by a
//! [`LoadGenerator`] whose workers post conversion requests at a target rate.
//! The rate can be ramped while a test runs, and requests can optionally carry
//! spoofed client addresses to simulate distributed traffic.
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::currency::Currency;

pub mod generator;
pub mod ip;
pub mod manager;
pub mod patterns;
pub mod report;
pub mod routes;
pub mod scenarios;
pub mod server;
pub mod users;

pub use generator::LoadGenerator;
pub use ip::IpGenerator;
pub use manager::{DEFAULT_TEST_ID, LoadTestManager};
pub use patterns::CurrencyPatterns;

pub const MAX_ERROR_INJECTION_RATE: f64 = 0.5;
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    #[error("Load test {0} is already running")]
    AlreadyRunning(String),

    #[error("No load test is currently running for {0}")]
    NotRunning(String),

    #[error("Load test {0} not found")]
    NotFound(String),

    #[error("Scenario '{0}' not found")]
    UnknownScenario(String),

    #[error("Invalid load test configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl ResponseError for LoadTestError {
    fn status_code(&self) -> StatusCode {
        match self {
            LoadTestError::AlreadyRunning(_) | LoadTestError::NotRunning(_) => StatusCode::CONFLICT,
            LoadTestError::NotFound(_) | LoadTestError::UnknownScenario(_) => StatusCode::NOT_FOUND,
            LoadTestError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoadTestError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        log::warn!("Load test request failed: {self}");
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTestStatus {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl LoadTestStatus {
    pub fn is_active(self) -> bool {
        matches!(self, LoadTestStatus::Starting | LoadTestStatus::Running)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, LoadTestStatus::Stopped | LoadTestStatus::Error)
    }
}

fn default_rps() -> f64 {
    1.0
}

fn default_error_rate() -> f64 {
    0.05
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestConfig {
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,
    /// `FROM_TO` codes, e.g. `USD_EUR`.
    #[serde(default)]
    pub currency_pairs: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<Decimal>,
    #[serde(default)]
    pub error_injection_enabled: bool,
    #[serde(default = "default_error_rate")]
    pub error_injection_rate: f64,
    #[serde(default)]
    pub ip_spoofing_enabled: bool,
    /// Keeps one spoofed address for the whole test instead of rotating.
    #[serde(default)]
    pub burst_mode: bool,
    /// Spread a ramp over this many seconds instead of switching at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_duration_seconds: Option<f64>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self::with_rps(default_rps())
    }
}

pub fn parse_pair(pair: &str) -> Result<(Currency, Currency), LoadTestError> {
    let invalid = || LoadTestError::InvalidConfig(format!("invalid currency pair '{pair}'"));

    let (from, to) = pair.split_once('_').ok_or_else(invalid)?;
    let from = from.parse().map_err(|_| invalid())?;
    let to = to.parse().map_err(|_| invalid())?;

    Ok((from, to))
}

impl LoadTestConfig {
    pub fn with_rps(requests_per_second: f64) -> Self {
        Self {
            requests_per_second,
            currency_pairs: Vec::new(),
            amounts: Vec::new(),
            error_injection_enabled: false,
            error_injection_rate: default_error_rate(),
            ip_spoofing_enabled: false,
            burst_mode: false,
            ramp_duration_seconds: None,
        }
    }

    pub fn validate(&self, max_rps: f64) -> Result<(), LoadTestError> {
        let invalid = |msg: String| Err(LoadTestError::InvalidConfig(msg));

        let rps = self.requests_per_second;
        if !rps.is_finite() || rps < MIN_REQUESTS_PER_SECOND || rps > max_rps {
            return invalid(format!(
                "requests_per_second must be between {MIN_REQUESTS_PER_SECOND} and {max_rps}, got {rps}"
            ));
        }
        if !(0.0..=MAX_ERROR_INJECTION_RATE).contains(&self.error_injection_rate) {
            return invalid(format!(
                "error_injection_rate must be between 0.0 and {MAX_ERROR_INJECTION_RATE}"
            ));
        }
        if let Some(amount) = self.amounts.iter().find(|a| **a <= Decimal::ZERO) {
            return invalid(format!("amounts must be positive, got {amount}"));
        }
        if let Some(d) = self.ramp_duration_seconds
            && (!d.is_finite() || d < 0.0)
        {
            return invalid(format!("ramp_duration_seconds must be non-negative, got {d}"));
        }
        for pair in &self.currency_pairs {
            parse_pair(pair)?;
        }

        Ok(())
    }

    /// Fills empty pairs and amounts from the pattern catalogue.
    pub fn ensure_complete(mut self) -> Self {
        if self.currency_pairs.is_empty() {
            self.currency_pairs = CurrencyPatterns::all_pairs();
        }
        if self.amounts.is_empty() {
            self.amounts = CurrencyPatterns::amounts_for_pairs(&self.currency_pairs);
        }
        self
    }

    /// Pairs that parse, in configured order.
    pub fn pairs(&self) -> Vec<(Currency, Currency)> {
        self.currency_pairs
            .iter()
            .filter_map(|p| parse_pair(p).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestResponse {
    pub test_id: String,
    pub status: LoadTestStatus,
    pub config: Option<LoadTestConfig>,
    pub stats: LoadStats,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl LoadTestResponse {
    pub fn idle(test_id: &str) -> Self {
        Self {
            test_id: test_id.to_string(),
            status: LoadTestStatus::Idle,
            config: None,
            stats: LoadStats::default(),
            started_at: None,
            stopped_at: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartLoadTestRequest {
    pub config: Option<LoadTestConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_empty_json() {
        let config: LoadTestConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.requests_per_second, 1.0);
        assert_eq!(config.error_injection_rate, 0.05);
        assert!(config.currency_pairs.is_empty());
        assert!(config.ramp_duration_seconds.is_none());
    }

    #[test]
    fn validation_bounds() {
        assert!(LoadTestConfig::with_rps(10.0).validate(100.0).is_ok());
        assert!(LoadTestConfig::with_rps(0.0).validate(100.0).is_err());
        assert!(LoadTestConfig::with_rps(101.0).validate(100.0).is_err());
        assert!(LoadTestConfig::with_rps(1e-20).validate(100.0).is_err());
        assert!(LoadTestConfig::with_rps(MIN_REQUESTS_PER_SECOND).validate(100.0).is_ok());

        let mut config = LoadTestConfig::with_rps(1.0);
        config.error_injection_rate = 0.6;
        assert!(matches!(
            config.validate(100.0),
            Err(LoadTestError::InvalidConfig(_))
        ));

        let mut config = LoadTestConfig::with_rps(1.0);
        config.currency_pairs = vec!["USD_XXX".to_string()];
        assert!(config.validate(100.0).is_err());

        let mut config = LoadTestConfig::with_rps(1.0);
        config.amounts = vec![Decimal::ZERO];
        assert!(config.validate(100.0).is_err());
    }

    #[test]
    fn ensure_complete_fills_only_empty_fields() {
        let config = LoadTestConfig::with_rps(2.0).ensure_complete();
        assert!(config.currency_pairs.contains(&"USD_EUR".to_string()));
        assert!(!config.amounts.is_empty());

        let mut custom = LoadTestConfig::with_rps(2.0);
        custom.currency_pairs = vec!["GBP_JPY".to_string()];
        let custom = custom.ensure_complete();
        assert_eq!(custom.currency_pairs, vec!["GBP_JPY"]);
        assert!(custom.amounts.contains(&Decimal::new(75, 0)));
    }

    #[test]
    fn parses_pairs() {
        assert_eq!(parse_pair("usd_eur").unwrap(), (Currency::Usd, Currency::Eur));
        assert!(parse_pair("USDEUR").is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LoadTestStatus::Running).unwrap(),
            r#""running""#
        );
        assert!(LoadTestStatus::Starting.is_active());
        assert!(LoadTestStatus::Error.is_finished());
    }
}
