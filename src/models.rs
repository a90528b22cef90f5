//! Request and response bodies of the conversion API.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    currency::{BASE_CURRENCY, Currency},
    exchange_rate::{Conversion, RateTable},
    store::RateRecord,
};

pub const RATE_SOURCE: &str = "simulated";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversionMetadata {
    pub rate_source: String,
    pub calculation_method: String,
    pub precision: String,
}

impl Default for ConversionMetadata {
    fn default() -> Self {
        Self {
            rate_source: RATE_SOURCE.to_string(),
            calculation_method: "direct".to_string(),
            precision: "4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResponse {
    pub conversion_id: Uuid,
    pub request_id: Uuid,
    pub amount: Decimal,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
    pub rate_timestamp: DateTime<Utc>,
    pub conversion_timestamp: DateTime<Utc>,
    pub metadata: ConversionMetadata,
}

impl ConversionResponse {
    pub fn new(conversion: Conversion, request_id: Uuid) -> Self {
        Self {
            conversion_id: Uuid::now_v7(),
            request_id,
            amount: conversion.amount,
            from_currency: conversion.from,
            to_currency: conversion.to,
            converted_amount: conversion.converted_amount,
            exchange_rate: conversion.exchange_rate,
            rate_timestamp: conversion.rate_timestamp,
            conversion_timestamp: Utc::now(),
            metadata: ConversionMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateInfo {
    pub currency: Currency,
    pub rate: Decimal,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesMetadata {
    pub rate_source: String,
    pub total_currencies: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesResponse {
    pub base_currency: Currency,
    pub rates: Vec<RateInfo>,
    pub timestamp: DateTime<Utc>,
    pub metadata: RatesMetadata,
}

impl From<&RateTable> for RatesResponse {
    fn from(table: &RateTable) -> Self {
        let rates: Vec<RateInfo> = table
            .iter()
            .map(|(currency, rate)| RateInfo {
                currency,
                rate,
                last_updated: table.updated_at(),
            })
            .collect();

        Self {
            base_currency: BASE_CURRENCY,
            metadata: RatesMetadata {
                rate_source: RATE_SOURCE.to_string(),
                total_currencies: rates.len().to_string(),
            },
            rates,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRateInfo {
    pub currency: String,
    pub rate: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub base_currency: String,
    pub rate_source: String,
}

impl From<RateRecord> for HistoricalRateInfo {
    fn from(record: RateRecord) -> Self {
        Self {
            currency: record.currency,
            rate: record.rate,
            recorded_at: record.recorded_at,
            base_currency: record.base_currency,
            rate_source: record.rate_source,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMetadata {
    pub rate_source: String,
    pub data_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatesHistoryResponse {
    pub currency: Option<Currency>,
    pub rates: Vec<HistoricalRateInfo>,
    pub period: Period,
    pub total_records: usize,
    pub base_currency: Currency,
    pub timestamp: DateTime<Utc>,
    pub metadata: HistoryMetadata,
}

impl RatesHistoryResponse {
    /// `window` is used as the period when no records matched.
    pub fn new(currency: Option<Currency>, records: Vec<RateRecord>, window: Period) -> Self {
        let rates: Vec<HistoricalRateInfo> = records.into_iter().map(Into::into).collect();

        let period = match (
            rates.iter().map(|r| r.recorded_at).min(),
            rates.iter().map(|r| r.recorded_at).max(),
        ) {
            (Some(start), Some(end)) => Period { start, end },
            _ => window,
        };

        Self {
            currency,
            total_records: rates.len(),
            rates,
            period,
            base_currency: BASE_CURRENCY,
            timestamp: Utc::now(),
            metadata: HistoryMetadata {
                rate_source: RATE_SOURCE.to_string(),
                data_interval: "hourly".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn conversion_request_accepts_numeric_amounts() {
        let request: ConversionRequest = serde_json::from_str(
            r#"{"amount": 100.5, "from_currency": "usd", "to_currency": "EUR"}"#,
        )
        .unwrap();
        assert_eq!(request.amount, Decimal::new(1005, 1));
        assert!(request.request_id.is_none());
    }

    #[test]
    fn rates_response_lists_every_currency() {
        let table = RateTable::simulated();
        let response = RatesResponse::from(&table);
        assert_eq!(response.rates.len(), Currency::ALL.len());
        assert_eq!(response.metadata.total_currencies, "10");
        assert_eq!(response.base_currency, Currency::Usd);
    }

    #[test]
    fn history_period_falls_back_to_window() {
        let now = Utc::now();
        let window = Period {
            start: now - Duration::days(7),
            end: now,
        };
        let response = RatesHistoryResponse::new(None, Vec::new(), window.clone());
        assert_eq!(response.total_records, 0);
        assert_eq!(response.period.start, window.start);
        assert_eq!(response.period.end, window.end);
    }
}
