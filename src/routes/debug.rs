//! Activity analysis over recent conversions, used when investigating
//! abusive traffic.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{AppState, check_range};
use crate::{auth::UserContext, error::ApiError, metrics::Metrics, store::ConversionRecord};

const TOP_PAIRS: usize = 10;
/// Fewest intervals a user needs before their timing is judged.
const MIN_INTERVALS: usize = 5;
const BOT_MAX_AVG_INTERVAL_SECS: f64 = 5.0;
const BOT_MAX_DEVIATION_SECS: f64 = 2.0;

fn default_minutes() -> i64 {
    10
}

fn default_users() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    #[serde(default = "default_minutes")]
    pub minutes: i64,
    #[serde(default = "default_users")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct PatternParams {
    #[serde(default = "default_minutes")]
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub minutes: i64,
}

impl TimeWindow {
    pub fn ending_at(end: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start: end - Duration::minutes(minutes),
            end,
            minutes,
        }
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserActivity {
    pub user_id: String,
    pub account_id: String,
    pub request_count: usize,
    pub requests_per_minute: f64,
    pub first_request: DateTime<Utc>,
    pub last_request: DateTime<Utc>,
    pub time_span_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub total_active_users: usize,
    pub total_requests: usize,
    pub avg_requests_per_user: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserActivityReport {
    pub time_window: TimeWindow,
    pub summary: ActivitySummary,
    pub users: Vec<UserActivity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiAccountUser {
    pub user_id: String,
    pub account_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousUser {
    pub user_id: String,
    pub request_count: usize,
    pub avg_interval_seconds: f64,
    pub pattern: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatternSummary {
    pub total_requests: usize,
    pub unique_users: usize,
    pub unique_accounts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairCount {
    pub pair: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Patterns {
    pub top_currency_pairs: Vec<PairCount>,
    pub multi_account_users: Vec<MultiAccountUser>,
    pub suspicious_users: Vec<SuspiciousUser>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestPatternReport {
    pub time_window: TimeWindow,
    pub summary: PatternSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Patterns>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per (user, account) request counts, busiest first.
pub fn user_activity(
    records: &[ConversionRecord],
    window: TimeWindow,
    limit: usize,
) -> UserActivityReport {
    let mut groups: HashMap<(&str, &str), (usize, DateTime<Utc>, DateTime<Utc>)> = HashMap::new();

    for record in records.iter().filter(|r| window.contains(r.converted_at)) {
        let at = record.converted_at;
        groups
            .entry((record.user_id.as_str(), record.account_id.as_str()))
            .and_modify(|(count, first, last)| {
                *count += 1;
                *first = (*first).min(at);
                *last = (*last).max(at);
            })
            .or_insert((1, at, at));
    }

    let mut users: Vec<UserActivity> = groups
        .into_iter()
        .map(|((user_id, account_id), (count, first, last))| {
            let span = ((last - first).num_milliseconds() as f64 / 60_000.0).max(1.0);

            UserActivity {
                user_id: user_id.to_string(),
                account_id: account_id.to_string(),
                request_count: count,
                requests_per_minute: round2(count as f64 / span),
                first_request: first,
                last_request: last,
                time_span_minutes: round2(span),
            }
        })
        .collect();

    users.sort_by(|a, b| {
        b.request_count
            .cmp(&a.request_count)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    users.truncate(limit);

    let total_requests: usize = users.iter().map(|u| u.request_count).sum();
    let avg_requests_per_user = if users.is_empty() {
        0.0
    } else {
        round2(total_requests as f64 / users.len() as f64)
    };

    UserActivityReport {
        time_window: window,
        summary: ActivitySummary {
            total_active_users: users.len(),
            total_requests,
            avg_requests_per_user,
        },
        users,
    }
}

/// Top pairs, users spread over several accounts and users whose request
/// timing is too regular to be human.
pub fn request_patterns(records: &[ConversionRecord], window: TimeWindow) -> RequestPatternReport {
    let mut in_window: Vec<&ConversionRecord> = records
        .iter()
        .filter(|r| window.contains(r.converted_at))
        .collect();

    if in_window.is_empty() {
        return RequestPatternReport {
            time_window: window,
            summary: PatternSummary::default(),
            patterns: None,
        };
    }

    in_window.sort_by_key(|r| r.converted_at);

    let mut pairs: HashMap<String, usize> = HashMap::new();
    let mut accounts_by_user: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut timestamps_by_user: BTreeMap<&str, Vec<DateTime<Utc>>> = BTreeMap::new();

    for record in &in_window {
        *pairs
            .entry(format!("{}_to_{}", record.from_currency, record.to_currency))
            .or_default() += 1;
        accounts_by_user
            .entry(&record.user_id)
            .or_default()
            .insert(&record.account_id);
        timestamps_by_user
            .entry(&record.user_id)
            .or_default()
            .push(record.converted_at);
    }

    let mut top_currency_pairs: Vec<PairCount> = pairs
        .into_iter()
        .map(|(pair, count)| PairCount { pair, count })
        .collect();
    top_currency_pairs.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pair.cmp(&b.pair)));
    top_currency_pairs.truncate(TOP_PAIRS);

    let multi_account_users = accounts_by_user
        .iter()
        .filter(|(_, accounts)| accounts.len() > 1)
        .map(|(user_id, accounts)| MultiAccountUser {
            user_id: user_id.to_string(),
            account_count: accounts.len(),
        })
        .collect();

    let suspicious_users = timestamps_by_user
        .iter()
        .filter_map(|(user_id, times)| {
            let intervals: Vec<f64> = times
                .windows(2)
                .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
                .collect();
            if intervals.len() < MIN_INTERVALS {
                return None;
            }

            let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
            let regular = intervals
                .iter()
                .all(|i| (i - avg).abs() < BOT_MAX_DEVIATION_SECS);

            (avg < BOT_MAX_AVG_INTERVAL_SECS && regular).then(|| SuspiciousUser {
                user_id: user_id.to_string(),
                request_count: times.len(),
                avg_interval_seconds: round2(avg),
                pattern: "consistent_timing",
                description: "Requests with very regular intervals (potential bot)",
            })
        })
        .collect();

    let unique_accounts = in_window
        .iter()
        .map(|r| r.account_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    RequestPatternReport {
        time_window: window,
        summary: PatternSummary {
            total_requests: in_window.len(),
            unique_users: timestamps_by_user.len(),
            unique_accounts,
        },
        patterns: Some(Patterns {
            top_currency_pairs,
            multi_account_users,
            suspicious_users,
        }),
    }
}

async fn recent_conversions(
    state: &AppState,
    metrics: &Metrics,
    window: &TimeWindow,
) -> Result<Vec<ConversionRecord>, ApiError> {
    let result = state.store.conversions_since(window.start).await;
    metrics.record_database_operation("select", "conversion_history", result.is_ok());

    Ok(result?)
}

pub async fn user_activity_handler(
    _user: UserContext,
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
    params: web::Query<ActivityParams>,
) -> Result<HttpResponse, ApiError> {
    let minutes = check_range("minutes", params.minutes, 1, 60)?;
    let limit = check_range("limit", params.limit, 5, 100)?;

    let window = TimeWindow::ending_at(Utc::now(), minutes);
    let records = recent_conversions(&state, &metrics, &window).await?;

    Ok(HttpResponse::Ok().json(user_activity(&records, window, limit)))
}

pub async fn request_patterns_handler(
    _user: UserContext,
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
    params: web::Query<PatternParams>,
) -> Result<HttpResponse, ApiError> {
    let minutes = check_range("minutes", params.minutes, 1, 60)?;

    let window = TimeWindow::ending_at(Utc::now(), minutes);
    let records = recent_conversions(&state, &metrics, &window).await?;

    Ok(HttpResponse::Ok().json(request_patterns(&records, window)))
}
