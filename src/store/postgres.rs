use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    PgPool, Postgres, QueryBuilder,
    postgres::PgPoolOptions,
};
use uuid::Uuid;

use super::{
    ConversionRecord, HistoryQuery, NewConversion, RateRecord, Store, StoreResult,
};
use crate::{currency::BASE_CURRENCY, history::RateSample, models::RATE_SOURCE};

// Postgres caps bind parameters at 65535 per statement; 6 per row.
const RATE_INSERT_CHUNK: usize = 5000;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .max_lifetime(Duration::from_secs(60 * 60))
            .connect(database_url)
            .await?;

        log::info!("Connected to Postgres with up to {max_connections} connections");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        log::info!("Database migrations applied");

        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_conversion(&self, c: &NewConversion) -> StoreResult<ConversionRecord> {
        let record = sqlx::query_as::<_, ConversionRecord>(
            r#"
            INSERT INTO conversion_history
                (id, request_id, amount, from_currency, to_currency,
                 converted_amount, exchange_rate, account_id, user_id, converted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, request_id, amount, from_currency, to_currency,
                      converted_amount, exchange_rate, account_id, user_id, converted_at
            "#,
        )
        .bind(c.id)
        .bind(c.request_id)
        .bind(c.amount)
        .bind(c.from_currency.code())
        .bind(c.to_currency.code())
        .bind(c.converted_amount)
        .bind(c.exchange_rate)
        .bind(&c.account_id)
        .bind(&c.user_id)
        .bind(c.converted_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_rates(&self, samples: &[RateSample]) -> StoreResult<u64> {
        let mut stored = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in samples.chunks(RATE_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO rate_history (id, currency, rate, base_currency, recorded_at, rate_source) ",
            );

            builder.push_values(chunk, |mut row, sample| {
                row.push_bind(Uuid::now_v7())
                    .push_bind(sample.currency.code())
                    .push_bind(sample.rate)
                    .push_bind(BASE_CURRENCY.code())
                    .push_bind(sample.recorded_at)
                    .push_bind(RATE_SOURCE);
            });

            stored += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        Ok(stored)
    }

    async fn rate_history(&self, query: &HistoryQuery) -> StoreResult<Vec<RateRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, currency, rate, base_currency, recorded_at, rate_source \
             FROM rate_history WHERE recorded_at >= ",
        );
        builder
            .push_bind(query.start)
            .push(" AND recorded_at <= ")
            .push_bind(query.end);

        if let Some(currency) = query.currency {
            builder.push(" AND currency = ").push_bind(currency.code());
        }

        builder
            .push(" ORDER BY recorded_at DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        let records = builder
            .build_query_as::<RateRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn conversions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<ConversionRecord>> {
        let records = sqlx::query_as::<_, ConversionRecord>(
            r#"
            SELECT id, request_id, amount, from_currency, to_currency,
                   converted_amount, exchange_rate, account_id, user_id, converted_at
            FROM conversion_history
            WHERE converted_at >= $1
            ORDER BY converted_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
