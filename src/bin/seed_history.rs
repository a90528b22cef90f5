//! Writes simulated rate history so the dashboard and history endpoints have
//! something to show.
//!
//! Usage: `seed-history [DAYS]`. Without an argument `SEED_HISTORY_DAYS` is
//! read, falling back to 30 days.
use std::env;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::{SeedableRng, rngs::StdRng};
use valut::{
    config::{self, ApiConfig},
    exchange_rate::RateTable,
    history, store,
};

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;

fn requested_days() -> Result<u32> {
    let raw = env::args()
        .nth(1)
        .or_else(|| env::var("SEED_HISTORY_DAYS").ok());

    let days = match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid number of days: {raw}"))?,
        None => DEFAULT_DAYS,
    };

    if days == 0 || days > MAX_DAYS {
        bail!("Number of days must be between 1 and {MAX_DAYS}");
    }

    Ok(days)
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let days = requested_days()?;
    let config = ApiConfig::from_env()?;
    let store = store::connect(&config.database_url, config.database_max_connections).await?;

    let table = RateTable::simulated();
    let now = Utc::now();
    let mut rng = StdRng::from_entropy();

    let mut samples = history::simulate(&table, days, now, &mut rng);
    samples.extend(history::snapshot(&table, now));

    log::info!(
        "Generating {} rate samples for {days} days into the {} store",
        samples.len(),
        store.backend()
    );

    let inserted = store.insert_rates(&samples).await?;
    log::info!("Inserted {inserted} rate history records");

    Ok(())
}
