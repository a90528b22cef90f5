//! Simulated rate history and summary statistics over it.
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand_distr::StandardNormal;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::Serialize;

use crate::{
    currency::{BASE_CURRENCY, Currency},
    exchange_rate::{RATE_SCALE, RateTable},
    store::RateRecord,
};

/// Snapshot hours generated for every simulated day.
pub const SNAPSHOT_HOURS: [i64; 4] = [0, 6, 12, 18];

#[derive(Debug, Clone, PartialEq)]
pub struct RateSample {
    pub currency: Currency,
    pub rate: Decimal,
    pub recorded_at: DateTime<Utc>,
}

fn volatility(currency: Currency) -> f64 {
    match currency {
        Currency::Jpy | Currency::Cny => 0.05,
        _ => 0.02,
    }
}

fn vary<R: Rng>(rng: &mut R, currency: Currency, base: Decimal) -> Decimal {
    if currency == BASE_CURRENCY {
        return Decimal::ONE;
    }

    let variation = rng.sample::<f64, _>(StandardNormal) * volatility(currency);
    let factor = Decimal::from_f64_retain(1.0 + variation).unwrap_or(Decimal::ONE);
    let floor = Decimal::new(1, RATE_SCALE);

    (base * factor)
        .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointNearestEven)
        .max(floor)
}

/// Four samples per day for `days_back` days ending at `now`, for every currency.
pub fn simulate<R: Rng>(
    table: &RateTable,
    days_back: u32,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<RateSample> {
    let mut samples = Vec::with_capacity(days_back as usize * SNAPSHOT_HOURS.len() * table.len());

    for day in 0..i64::from(days_back) {
        for hour in SNAPSHOT_HOURS {
            let recorded_at = now - Duration::days(day) - Duration::hours(hour);

            for (currency, base) in table.iter() {
                samples.push(RateSample {
                    currency,
                    rate: vary(rng, currency, base),
                    recorded_at,
                });
            }
        }
    }

    samples
}

/// Current table as one set of samples.
pub fn snapshot(table: &RateTable, now: DateTime<Utc>) -> Vec<RateSample> {
    table
        .iter()
        .map(|(currency, rate)| RateSample {
            currency,
            rate,
            recorded_at: now,
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateStatistics {
    pub min_rate: f64,
    pub max_rate: f64,
    pub avg_rate: f64,
    pub current_rate: f64,
    pub change_percent: f64,
    pub volatility: f64,
    pub total_records: usize,
}

impl RateStatistics {
    /// `records` must be ordered newest first, as the store returns them.
    pub fn from_records(records: &[RateRecord]) -> Self {
        let rates: Vec<f64> = records
            .iter()
            .filter_map(|r| r.rate.to_f64())
            .collect();

        let (Some(&current_rate), Some(&oldest_rate)) = (rates.first(), rates.last()) else {
            return Self::default();
        };

        let count = rates.len() as f64;
        let min_rate = rates.iter().copied().fold(f64::INFINITY, f64::min);
        let max_rate = rates.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_rate = rates.iter().sum::<f64>() / count;

        let change_percent = if oldest_rate != 0.0 {
            (current_rate - oldest_rate) / oldest_rate * 100.0
        } else {
            0.0
        };

        let volatility = if rates.len() > 1 {
            let variance = rates.iter().map(|r| (r - avg_rate).powi(2)).sum::<f64>() / count;
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            min_rate,
            max_rate,
            avg_rate,
            current_rate,
            change_percent,
            volatility,
            total_records: rates.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub rate: f64,
    pub currency: String,
}

/// Oldest first.
pub fn chart_points(records: &[RateRecord]) -> Vec<ChartPoint> {
    records
        .iter()
        .rev()
        .map(|r| ChartPoint {
            timestamp: r.recorded_at,
            rate: r.rate.to_f64().unwrap_or_default(),
            currency: r.currency.clone(),
        })
        .collect()
}
