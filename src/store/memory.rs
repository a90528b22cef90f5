use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ConversionRecord, HistoryQuery, NewConversion, RateRecord, Store, StoreResult};
use crate::history::RateSample;

#[derive(Default)]
pub struct MemoryStore {
    conversions: RwLock<Vec<ConversionRecord>>,
    rates: RwLock<Vec<RateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_conversion(&self, conversion: &NewConversion) -> StoreResult<ConversionRecord> {
        let record = ConversionRecord::from(conversion);
        self.conversions.write().await.push(record.clone());

        Ok(record)
    }

    async fn insert_rates(&self, samples: &[RateSample]) -> StoreResult<u64> {
        let mut rates = self.rates.write().await;
        rates.extend(samples.iter().map(RateRecord::from_sample));

        Ok(samples.len() as u64)
    }

    async fn rate_history(&self, query: &HistoryQuery) -> StoreResult<Vec<RateRecord>> {
        let rates = self.rates.read().await;

        let mut matching: Vec<RateRecord> = rates
            .iter()
            .filter(|r| r.recorded_at >= query.start && r.recorded_at <= query.end)
            .filter(|r| {
                query
                    .currency
                    .is_none_or(|c| c.code() == r.currency)
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        matching.truncate(query.limit as usize);

        Ok(matching)
    }

    async fn conversions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<ConversionRecord>> {
        let conversions = self.conversions.read().await;

        let mut matching: Vec<ConversionRecord> = conversions
            .iter()
            .filter(|c| c.converted_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.converted_at);

        Ok(matching)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
