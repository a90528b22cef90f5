//! Environment configuration for both services.
//!
//! Values come from the process environment, with a `.env` file loaded first
//! through `dotenvy` when one is present. Missing keys fall back to defaults;
//! present but malformed keys are an error.
use std::{env, fmt::Display, str::FromStr};

use anyhow::{Context, Result, bail};

use crate::store::MEMORY_URL;

pub const MIN_SECRET_LEN: usize = 16;
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-key-change-in-production";
pub const VALID_REGIONS: [&str; 3] = ["US", "EU", "APAC"];

/// Loads `.env` if one exists. Safe to call more than once.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => log::warn!("Ignoring malformed .env file: {e}"),
    }
}

struct Source<F> {
    lookup: F,
    prefix: &'static str,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{}{key}", self.prefix))
    }

    fn get<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        match self.raw(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid {}{key} value '{value}': {e}", self.prefix)),
            None => {
                log::debug!("{}{key} not set, using default: {default}", self.prefix);
                Ok(default)
            }
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }
}

fn validate_port(name: &str, port: u16) -> Result<u16> {
    if port == 0 {
        bail!("{name} must be between 1 and 65535");
    }

    Ok(port)
}

fn validate_secret(secret: String) -> Result<String> {
    if secret.trim().is_empty() {
        bail!("JWT secret key cannot be empty");
    }
    if secret.len() < MIN_SECRET_LEN {
        bail!("JWT secret key must be at least {MIN_SECRET_LEN} characters long");
    }

    Ok(secret)
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = Source { lookup, prefix: "" };

        let database_url = source.string("DATABASE_URL", MEMORY_URL);
        if database_url.trim().is_empty() {
            bail!("Database URL cannot be empty");
        }

        let database_max_connections: u32 = source.get("DATABASE_MAX_CONNECTIONS", 10)?;
        if database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be positive");
        }

        Ok(Self {
            host: source.string("API_HOST", "0.0.0.0"),
            port: validate_port("API_PORT", source.get("API_PORT", 8000)?)?,
            database_url,
            database_max_connections,
            jwt_secret: validate_secret(source.string("JWT_SECRET_KEY", DEFAULT_JWT_SECRET))?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpSpoofingConfig {
    pub enabled: bool,
    pub rotation_interval: u32,
    pub regions: Vec<String>,
    pub include_residential: bool,
    pub include_datacenter: bool,
}

impl Default for IpSpoofingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rotation_interval: 5,
            regions: VALID_REGIONS.iter().map(|r| r.to_string()).collect(),
            include_residential: true,
            include_datacenter: true,
        }
    }
}

/// Upper-cased, deduplicated, order preserved.
pub fn parse_regions(raw: &str) -> Result<Vec<String>> {
    let mut regions: Vec<String> = Vec::new();

    for region in raw.split(',').map(|r| r.trim().to_uppercase()) {
        if region.is_empty() {
            continue;
        }
        if !VALID_REGIONS.contains(&region.as_str()) {
            bail!(
                "Invalid region '{region}'. Must be one of: {}",
                VALID_REGIONS.join(", ")
            );
        }
        if !regions.contains(&region) {
            regions.push(region);
        }
    }

    if regions.is_empty() {
        bail!("At least one geographic region must be specified");
    }

    Ok(regions)
}

#[derive(Debug, Clone)]
pub struct LoadTesterConfig {
    pub host: String,
    pub port: u16,
    pub target_api_base_url: String,
    pub jwt_secret: String,
    pub default_requests_per_second: f64,
    pub max_requests_per_second: f64,
    pub request_timeout_secs: f64,
    pub max_workers: usize,
    pub latency_compensation: bool,
    pub min_sleep_ms: f64,
    pub jitter: f64,
    pub ip_spoofing: IpSpoofingConfig,
}

impl LoadTesterConfig {
    pub const PREFIX: &'static str = "LOAD_TESTER_";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = Source {
            lookup,
            prefix: Self::PREFIX,
        };

        let default_requests_per_second: f64 = source.get("DEFAULT_REQUESTS_PER_SECOND", 1.0)?;
        let max_requests_per_second: f64 = source.get("MAX_REQUESTS_PER_SECOND", 100.0)?;
        if !(default_requests_per_second.is_finite() && default_requests_per_second > 0.0)
            || !(max_requests_per_second.is_finite() && max_requests_per_second > 0.0)
        {
            bail!("Requests per second must be positive and finite");
        }

        let request_timeout_secs: f64 = source.get("REQUEST_TIMEOUT", 30.0)?;
        if !(request_timeout_secs.is_finite() && request_timeout_secs > 0.0) {
            bail!("Request timeout must be positive and finite");
        }

        let max_workers: usize = source.get("MAX_WORKERS", 50)?;
        if max_workers == 0 || max_workers > 200 {
            bail!("Maximum workers must be between 1 and 200");
        }

        let min_sleep_ms: f64 = source.get("MIN_SLEEP_THRESHOLD_MS", 1.0)?;
        if !(min_sleep_ms.is_finite() && min_sleep_ms >= 0.0) {
            bail!("Minimum sleep threshold must be non-negative");
        }

        let jitter: f64 = source.get("JITTER_PERCENTAGE", 0.15)?;
        if !(0.0..=0.5).contains(&jitter) {
            bail!("Jitter percentage must be between 0.0 and 0.5");
        }

        let rotation_interval: u32 = source.get("IP_ROTATION_INTERVAL", 5)?;
        if rotation_interval == 0 {
            bail!("IP rotation interval must be positive");
        }

        let regions = parse_regions(&source.string("IP_GEOGRAPHIC_REGIONS", "US,EU,APAC"))
            .context("Invalid LOAD_TESTER_IP_GEOGRAPHIC_REGIONS")?;

        Ok(Self {
            host: source.string("API_HOST", "0.0.0.0"),
            port: validate_port("LOAD_TESTER_API_PORT", source.get("API_PORT", 8001)?)?,
            target_api_base_url: source
                .string("TARGET_API_BASE_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: validate_secret(source.string("JWT_SECRET_KEY", DEFAULT_JWT_SECRET))?,
            default_requests_per_second,
            max_requests_per_second,
            request_timeout_secs,
            max_workers,
            latency_compensation: source.get("LATENCY_COMPENSATION_ENABLED", true)?,
            min_sleep_ms,
            jitter,
            ip_spoofing: IpSpoofingConfig {
                enabled: source.get("IP_SPOOFING_ENABLED", false)?,
                rotation_interval,
                regions,
                include_residential: source.get("INCLUDE_RESIDENTIAL_IPS", true)?,
                include_datacenter: source.get("INCLUDE_DATACENTER_IPS", true)?,
            },
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn api_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.database_url, MEMORY_URL);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn api_rejects_bad_values() {
        assert!(ApiConfig::from_lookup(lookup(&[("API_PORT", "0")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("API_PORT", "70000")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("API_PORT", "abc")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("DATABASE_URL", " ")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("JWT_SECRET_KEY", "short")])).is_err());
    }

    #[test]
    fn load_tester_reads_prefixed_keys() {
        let config = LoadTesterConfig::from_lookup(lookup(&[
            ("LOAD_TESTER_API_PORT", "9001"),
            ("LOAD_TESTER_TARGET_API_BASE_URL", "http://api:8000/"),
            ("LOAD_TESTER_IP_SPOOFING_ENABLED", "true"),
            ("LOAD_TESTER_IP_GEOGRAPHIC_REGIONS", "eu, us,EU"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9001);
        assert_eq!(config.target_api_base_url, "http://api:8000");
        assert!(config.ip_spoofing.enabled);
        assert_eq!(config.ip_spoofing.regions, vec!["EU", "US"]);
        assert_eq!(config.max_workers, 50);
    }

    #[test]
    fn load_tester_rejects_bad_values() {
        assert!(
            LoadTesterConfig::from_lookup(lookup(&[("LOAD_TESTER_REQUEST_TIMEOUT", "0")])).is_err()
        );
        assert!(
            LoadTesterConfig::from_lookup(lookup(&[("LOAD_TESTER_JITTER_PERCENTAGE", "0.9")]))
                .is_err()
        );
        assert!(
            LoadTesterConfig::from_lookup(lookup(&[("LOAD_TESTER_MAX_WORKERS", "500")])).is_err()
        );
        for timeout in ["inf", "NaN"] {
            assert!(
                LoadTesterConfig::from_lookup(lookup(&[("LOAD_TESTER_REQUEST_TIMEOUT", timeout)]))
                    .is_err()
            );
        }
        assert!(
            LoadTesterConfig::from_lookup(lookup(&[(
                "LOAD_TESTER_MAX_REQUESTS_PER_SECOND",
                "inf"
            )]))
            .is_err()
        );
    }

    #[test]
    fn regions_are_validated() {
        assert_eq!(parse_regions("apac").unwrap(), vec!["APAC"]);
        assert!(parse_regions("").is_err());
        assert!(parse_regions(" , ").is_err());
        assert!(parse_regions("US,MARS").is_err());
    }
}
