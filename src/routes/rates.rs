use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use super::{AppState, check_range};
use crate::{
    currency::{BASE_CURRENCY, Currency},
    error::ApiError,
    history::{ChartPoint, RateStatistics, chart_points},
    metrics::Metrics,
    models::{Period, RatesHistoryResponse, RatesResponse},
    store::{HistoryQuery, RateRecord},
};

const HISTORY_TABLE: &str = "rate_history";
const MAX_DAYS: u32 = 365;
const MAX_LIMIT: u32 = 10_000;
/// Four snapshots a day for a year.
const STATISTICS_LIMIT: u32 = 4 * MAX_DAYS;

fn default_history_days() -> u32 {
    7
}

fn default_statistics_days() -> u32 {
    30
}

fn default_limit() -> u32 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub currency: Option<String>,
    #[serde(default = "default_history_days")]
    pub days: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    #[serde(default = "default_statistics_days")]
    pub days: u32,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub currency: Currency,
    pub base_currency: Currency,
    pub days: u32,
    pub statistics: RateStatistics,
    pub chart: Vec<ChartPoint>,
}

async fn load_history(
    state: &AppState,
    metrics: &Metrics,
    query: &HistoryQuery,
) -> Result<Vec<RateRecord>, ApiError> {
    let result = state.store.rate_history(query).await;
    metrics.record_database_operation("select", HISTORY_TABLE, result.is_ok());

    Ok(result?)
}

pub async fn current_rates(
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
) -> HttpResponse {
    metrics.record_rates_request("current_rates", true);
    HttpResponse::Ok().json(RatesResponse::from(state.rates.as_ref()))
}

pub async fn rates_history(
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
    params: web::Query<HistoryParams>,
) -> Result<HttpResponse, ApiError> {
    let result = history_response(&state, &metrics, params.into_inner()).await;
    metrics.record_rates_request("rates_history", result.is_ok());

    Ok(HttpResponse::Ok().json(result?))
}

async fn history_response(
    state: &AppState,
    metrics: &Metrics,
    params: HistoryParams,
) -> Result<RatesHistoryResponse, ApiError> {
    let days = check_range("days", params.days, 1, MAX_DAYS)?;
    let limit = check_range("limit", params.limit, 1, MAX_LIMIT)?;
    let currency = params
        .currency
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<Currency>)
        .transpose()?;

    let query = HistoryQuery::last_days(currency, days, limit);
    let records = load_history(state, metrics, &query).await?;
    log::debug!(
        "Loaded {} history records for {} over {days} days",
        records.len(),
        currency.map_or("all currencies", Currency::code)
    );

    let window = Period {
        start: query.start,
        end: query.end,
    };

    Ok(RatesHistoryResponse::new(currency, records, window))
}

pub async fn rate_statistics(
    state: web::Data<AppState>,
    metrics: web::Data<Metrics>,
    currency: web::Path<String>,
    params: web::Query<StatisticsParams>,
) -> Result<HttpResponse, ApiError> {
    let result = statistics_response(&state, &metrics, &currency, params.days).await;
    metrics.record_rates_request("rates_statistics", result.is_ok());

    Ok(HttpResponse::Ok().json(result?))
}

async fn statistics_response(
    state: &AppState,
    metrics: &Metrics,
    currency: &str,
    days: u32,
) -> Result<StatisticsResponse, ApiError> {
    let days = check_range("days", days, 1, MAX_DAYS)?;
    let currency: Currency = currency.parse()?;

    let query = HistoryQuery::last_days(Some(currency), days, STATISTICS_LIMIT);
    let records = load_history(state, metrics, &query).await?;

    Ok(StatisticsResponse {
        currency,
        base_currency: BASE_CURRENCY,
        days,
        statistics: RateStatistics::from_records(&records),
        chart: chart_points(&records),
    })
}

/// Seven-day summary for every non-base currency, used by the dashboard.
pub(crate) async fn weekly_statistics(
    state: &AppState,
    metrics: &Metrics,
) -> Result<Vec<(Currency, RateStatistics)>, ApiError> {
    let mut out = Vec::with_capacity(Currency::ALL.len());

    for currency in Currency::ALL.into_iter().filter(|c| !c.is_base()) {
        let query = HistoryQuery::last_days(Some(currency), 7, STATISTICS_LIMIT);
        let records = load_history(state, metrics, &query).await?;
        out.push((currency, RateStatistics::from_records(&records)));
    }

    Ok(out)
}
