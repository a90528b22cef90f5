//! Predefined load profiles.
use std::{collections::BTreeMap, fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{LoadTestConfig, LoadTestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Light,
    Moderate,
    Heavy,
    Stress,
    Spike,
    Endurance,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioConfig {
    pub name: &'static str,
    pub description: &'static str,
    pub config: LoadTestConfig,
    /// Recommended run time.
    pub duration_seconds: u64,
    pub expected_behavior: &'static str,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Light,
        Scenario::Moderate,
        Scenario::Heavy,
        Scenario::Stress,
        Scenario::Spike,
        Scenario::Endurance,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Scenario::Light => "light",
            Scenario::Moderate => "moderate",
            Scenario::Heavy => "heavy",
            Scenario::Stress => "stress",
            Scenario::Spike => "spike",
            Scenario::Endurance => "endurance",
        }
    }

    pub fn config(self) -> ScenarioConfig {
        match self {
            Scenario::Light => ScenarioConfig {
                name: "Light Load Test",
                description: "Baseline load test with minimal traffic to verify basic functionality",
                config: profile(0.5, &["USD_EUR", "USD_GBP"], &[100, 500]),
                duration_seconds: 60,
                expected_behavior: "System should handle easily with minimal resource usage",
            },
            Scenario::Moderate => ScenarioConfig {
                name: "Moderate Load Test",
                description: "Typical production load to verify normal operation capacity",
                config: profile(
                    5.0,
                    &["USD_EUR", "USD_GBP", "EUR_GBP", "USD_JPY"],
                    &[100, 500, 1000, 2500],
                ),
                duration_seconds: 120,
                expected_behavior: "System should perform normally with good response times",
            },
            Scenario::Heavy => ScenarioConfig {
                name: "Heavy Load Test",
                description: "High traffic load to test system limits and performance degradation",
                config: profile(
                    15.0,
                    &["USD_EUR", "USD_GBP", "EUR_GBP", "USD_JPY", "USD_CAD"],
                    &[100, 250, 500, 1000, 2500],
                ),
                duration_seconds: 300,
                expected_behavior: "System may show increased response times but should remain stable",
            },
            Scenario::Stress => ScenarioConfig {
                name: "Stress Test",
                description: "Maximum sustainable load to find breaking point and failure modes",
                config: profile(
                    25.0,
                    &[
                        "USD_EUR", "USD_GBP", "EUR_GBP", "USD_JPY", "USD_CAD", "USD_AUD",
                        "USD_CHF", "USD_CNY", "USD_SEK", "USD_NZD",
                    ],
                    &[100, 250, 500, 1000, 2500],
                ),
                duration_seconds: 180,
                expected_behavior: "System will likely show performance degradation and may fail",
            },
            Scenario::Spike => ScenarioConfig {
                name: "Spike Test",
                description: "Sudden traffic spike to test system elasticity and recovery",
                config: profile(50.0, &["USD_EUR", "USD_GBP", "EUR_GBP"], &[100, 1000]),
                duration_seconds: 30,
                expected_behavior: "System should handle short bursts or gracefully degrade",
            },
            Scenario::Endurance => ScenarioConfig {
                name: "Endurance Test",
                description: "Extended moderate load to test system stability over time",
                config: profile(
                    3.0,
                    &["USD_EUR", "USD_GBP", "EUR_GBP", "USD_JPY"],
                    &[100, 500, 1000],
                ),
                duration_seconds: 30 * 60,
                expected_behavior: "System should maintain consistent performance over extended periods",
            },
        }
    }

    /// Scenario key to description.
    pub fn list() -> BTreeMap<&'static str, &'static str> {
        Self::ALL
            .iter()
            .map(|s| (s.key(), s.config().description))
            .collect()
    }
}

fn profile(rps: f64, pairs: &[&str], amounts: &[i64]) -> LoadTestConfig {
    LoadTestConfig {
        currency_pairs: pairs.iter().map(|p| p.to_string()).collect(),
        amounts: amounts.iter().map(|a| Decimal::from(*a)).collect(),
        ..LoadTestConfig::with_rps(rps)
    }
}

impl FromStr for Scenario {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LoadTestError::UnknownScenario(s.to_string()))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_rates() {
        let rates: Vec<f64> = Scenario::ALL
            .iter()
            .map(|s| s.config().config.requests_per_second)
            .collect();
        assert_eq!(rates, vec![0.5, 5.0, 15.0, 25.0, 50.0, 3.0]);
    }

    #[test]
    fn scenario_configs_are_valid() {
        for scenario in Scenario::ALL {
            let config = scenario.config();
            assert!(config.config.validate(100.0).is_ok(), "{scenario}");
            assert!(!config.config.currency_pairs.is_empty());
            assert!(!config.config.amounts.is_empty());
            assert!(config.duration_seconds > 0);
        }
    }

    #[test]
    fn parses_names() {
        assert_eq!("Spike".parse::<Scenario>().unwrap(), Scenario::Spike);
        assert!(matches!(
            "tsunami".parse::<Scenario>(),
            Err(LoadTestError::UnknownScenario(name)) if name == "tsunami"
        ));
        assert_eq!(Scenario::list().len(), 6);
        assert_eq!(Scenario::Endurance.config().duration_seconds, 1800);
    }
}
