//! Post-run analysis of a load test.
use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use super::{LoadStats, LoadTestResponse, LoadTestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Scores success rate (40 points), average latency (35) and throughput
/// against the target (25), then maps the total onto a letter.
pub fn grade(success_rate: f64, avg_response_ms: f64, achieved_rps: f64, target_rps: f64) -> Grade {
    let success = match success_rate {
        r if r >= 99.0 => 40,
        r if r >= 95.0 => 35,
        r if r >= 90.0 => 30,
        r if r >= 80.0 => 20,
        r if r >= 50.0 => 10,
        _ => 0,
    };

    let latency = match avg_response_ms {
        ms if ms <= 100.0 => 35,
        ms if ms <= 250.0 => 30,
        ms if ms <= 500.0 => 25,
        ms if ms <= 1000.0 => 15,
        ms if ms <= 2000.0 => 5,
        _ => 0,
    };

    let throughput = if target_rps > 0.0 {
        match achieved_rps / target_rps {
            ratio if ratio >= 0.95 => 25,
            ratio if ratio >= 0.85 => 20,
            ratio if ratio >= 0.75 => 15,
            ratio if ratio >= 0.50 => 10,
            ratio if ratio >= 0.25 => 5,
            _ => 0,
        }
    } else {
        25
    };

    match success + latency + throughput {
        s if s >= 90 => Grade::A,
        s if s >= 80 => Grade::B,
        s if s >= 70 => Grade::C,
        s if s >= 60 => Grade::D,
        _ => Grade::F,
    }
}

pub fn recommendations(
    success_rate: f64,
    avg_response_ms: f64,
    achieved_rps: f64,
    target_rps: f64,
) -> Vec<String> {
    let mut out = Vec::new();

    if success_rate < 80.0 {
        out.push("Critical: Very low success rate indicates system overload or errors");
    } else if success_rate < 95.0 {
        out.push("Warning: Success rate below 95% - investigate error causes");
    }

    if avg_response_ms > 1000.0 {
        out.push("High response times detected - consider scaling or optimization");
    } else if avg_response_ms > 500.0 {
        out.push("Moderate response time increase - monitor for degradation trends");
    }

    if target_rps > 0.0 {
        let ratio = achieved_rps / target_rps;
        if ratio < 0.75 {
            out.push("Throughput significantly below target - system may be bottlenecked");
        } else if ratio < 0.90 {
            out.push("Throughput slightly below target - minor performance impact");
        }
    }

    if success_rate >= 99.0 && avg_response_ms <= 250.0 {
        out.push("Excellent performance - system handling load very well");
    } else if success_rate >= 95.0 && avg_response_ms <= 500.0 {
        out.push("Good performance - system within acceptable parameters");
    }

    if out.is_empty() {
        out.push("Performance appears normal - continue monitoring");
    }

    out.into_iter().map(String::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadTestReport {
    pub test_id: String,
    pub scenario_name: Option<String>,
    pub status: LoadTestStatus,
    pub requests_per_second: f64,
    pub currency_pairs: Vec<String>,
    pub amounts: Vec<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub stats: LoadStats,
    /// Percent.
    pub success_rate: f64,
    pub avg_rps_achieved: f64,
    pub performance_grade: Grade,
    pub recommendations: Vec<String>,
    pub error_message: Option<String>,
}

impl LoadTestReport {
    /// Builds a report; a test that is still running is measured up to `now`.
    pub fn new(response: &LoadTestResponse, scenario_name: Option<&str>, now: DateTime<Utc>) -> Self {
        let duration_seconds = response.started_at.map(|started| {
            let end = response.stopped_at.unwrap_or(now);
            (end - started).num_milliseconds() as f64 / 1000.0
        });

        let stats = &response.stats;
        let success_rate = if stats.total_requests > 0 {
            stats.successful_requests as f64 / stats.total_requests as f64 * 100.0
        } else {
            0.0
        };
        let avg_rps_achieved = match duration_seconds {
            Some(secs) if secs > 0.0 => stats.total_requests as f64 / secs,
            _ => 0.0,
        };

        let (target_rps, currency_pairs, amounts) = match &response.config {
            Some(config) => (
                config.requests_per_second,
                config.currency_pairs.clone(),
                config.amounts.clone(),
            ),
            None => (0.0, Vec::new(), Vec::new()),
        };

        Self {
            test_id: response.test_id.clone(),
            scenario_name: scenario_name.map(String::from),
            status: response.status,
            requests_per_second: target_rps,
            currency_pairs,
            amounts,
            started_at: response.started_at,
            stopped_at: response.stopped_at,
            duration_seconds,
            stats: stats.clone(),
            success_rate,
            avg_rps_achieved,
            performance_grade: grade(
                success_rate,
                stats.avg_response_time_ms,
                avg_rps_achieved,
                target_rps,
            ),
            recommendations: recommendations(
                success_rate,
                stats.avg_response_time_ms,
                avg_rps_achieved,
                target_rps,
            ),
            error_message: response.error_message.clone(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let status = serde_json::to_value(self.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_uppercase))
            .unwrap_or_default();
        let amounts: Vec<String> = self
            .amounts
            .iter()
            .map(|a| format!("${}", money(*a)))
            .collect();
        let timestamp = |t: Option<DateTime<Utc>>| t.map_or("N/A".to_string(), |t| t.to_rfc3339());

        let mut md = String::new();
        let _ = write!(
            md,
            "# Load Test Report\n\n\
             ## Test Summary\n\
             - **Test ID**: {}\n\
             - **Scenario**: {}\n\
             - **Status**: {status}\n\
             - **Performance Grade**: **{}**\n\n\
             ## Test Configuration\n\
             - **Target RPS**: {}\n\
             - **Currency Pairs**: {}\n\
             - **Test Amounts**: {}\n\n\
             ## Execution Timeline\n\
             - **Started**: {}\n\
             - **Stopped**: {}\n\
             - **Duration**: {:.1}s\n\n\
             ## Performance Metrics\n\
             - **Total Requests**: {}\n\
             - **Successful**: {} ({:.1}%)\n\
             - **Failed**: {}\n\
             - **Avg Response Time**: {:.1}ms\n\
             - **Min Response Time**: {:.1}ms\n\
             - **Max Response Time**: {:.1}ms\n\
             - **Achieved RPS**: {:.2}\n\n\
             ## Recommendations\n",
            self.test_id,
            self.scenario_name.as_deref().unwrap_or("Custom"),
            self.performance_grade,
            self.requests_per_second,
            self.currency_pairs.join(", "),
            amounts.join(", "),
            timestamp(self.started_at),
            timestamp(self.stopped_at),
            self.duration_seconds.unwrap_or(0.0),
            thousands(self.stats.total_requests),
            thousands(self.stats.successful_requests),
            self.success_rate,
            thousands(self.stats.failed_requests),
            self.stats.avg_response_time_ms,
            self.stats.min_response_time_ms,
            self.stats.max_response_time_ms,
            self.avg_rps_achieved,
        );

        for (i, rec) in self.recommendations.iter().enumerate() {
            let _ = writeln!(md, "{}. {rec}", i + 1);
        }

        if let Some(error) = &self.error_message {
            let _ = write!(md, "\n## Error Details\n```\n{error}\n```\n");
        }

        md
    }
}

/// `1234567` as `1,234,567`.
fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}

/// Whole units with thousands separators.
fn money(amount: Decimal) -> String {
    let whole = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    let sign = if whole.is_sign_negative() && !whole.is_zero() { "-" } else { "" };
    let digits = whole.abs().trunc().to_string();

    match digits.parse::<u64>() {
        Ok(n) => format!("{sign}{}", thousands(n)),
        Err(_) => format!("{sign}{digits}"),
    }
}
