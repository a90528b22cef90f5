//! Persistence for conversions and rate history.
//!
//! Two backends share the [`Store`] trait: Postgres through sqlx for real
//! deployments and an in-process store for local runs and tests. The backend
//! is picked from `DATABASE_URL`; `memory://` selects the in-process one.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{currency::Currency, history::RateSample};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const MEMORY_URL: &str = "memory://";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ConversionRecord {
    pub id: Uuid,
    pub request_id: Option<Uuid>,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
    pub account_id: String,
    pub user_id: String,
    pub converted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RateRecord {
    pub id: Uuid,
    pub currency: String,
    pub rate: Decimal,
    pub base_currency: String,
    pub recorded_at: DateTime<Utc>,
    pub rate_source: String,
}

impl RateRecord {
    pub fn from_sample(sample: &RateSample) -> Self {
        Self {
            id: Uuid::now_v7(),
            currency: sample.currency.code().to_string(),
            rate: sample.rate,
            base_currency: crate::currency::BASE_CURRENCY.code().to_string(),
            recorded_at: sample.recorded_at,
            rate_source: crate::models::RATE_SOURCE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewConversion {
    pub id: Uuid,
    pub request_id: Option<Uuid>,
    pub amount: Decimal,
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub converted_amount: Decimal,
    pub exchange_rate: Decimal,
    pub account_id: String,
    pub user_id: String,
    pub converted_at: DateTime<Utc>,
}

impl From<&NewConversion> for ConversionRecord {
    fn from(c: &NewConversion) -> Self {
        Self {
            id: c.id,
            request_id: c.request_id,
            amount: c.amount,
            from_currency: c.from_currency.code().to_string(),
            to_currency: c.to_currency.code().to_string(),
            converted_amount: c.converted_amount,
            exchange_rate: c.exchange_rate,
            account_id: c.account_id.clone(),
            user_id: c.user_id.clone(),
            converted_at: c.converted_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub currency: Option<Currency>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
}

impl HistoryQuery {
    pub fn last_days(currency: Option<Currency>, days: u32, limit: u32) -> Self {
        let end = Utc::now();

        Self {
            currency,
            start: end - Duration::days(i64::from(days)),
            end,
            limit,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_conversion(&self, conversion: &NewConversion) -> StoreResult<ConversionRecord>;

    /// Writes every sample in one batch and returns the number of rows stored.
    async fn insert_rates(&self, samples: &[RateSample]) -> StoreResult<u64>;

    /// Newest first, at most `query.limit` rows.
    async fn rate_history(&self, query: &HistoryQuery) -> StoreResult<Vec<RateRecord>>;

    /// Oldest first.
    async fn conversions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<ConversionRecord>>;

    async fn ping(&self) -> StoreResult<()>;

    fn backend(&self) -> &'static str;
}

pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Arc<dyn Store>> {
    if database_url == MEMORY_URL {
        log::warn!("Using in-memory store, data will not survive restarts");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(database_url, max_connections).await?;
    store.migrate().await?;

    Ok(Arc::new(store))
}
