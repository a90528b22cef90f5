use actix_web::{App, HttpServer, middleware};
use anyhow::{Context, Result};

use crate::{
    auth::JwtKeys,
    config::ApiConfig,
    metrics::{self, Metrics},
    routes::{self, AppData, AppState},
    store,
};

pub async fn build_data(config: &ApiConfig) -> Result<AppData> {
    let store = store::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to the database")?;
    log::info!("Using {} storage backend", store.backend());

    let metrics = Metrics::new().context("Failed to register metrics")?;

    Ok(AppData::new(
        AppState::new(store),
        metrics,
        JwtKeys::new(&config.jwt_secret),
    ))
}

pub async fn run(config: ApiConfig) -> Result<()> {
    let data = build_data(&config).await?;
    let address = config.bind_address();

    log::info!("Starting currency API on {address}");

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::from_fn(metrics::track_requests))
            .wrap(middleware::Logger::default())
            .configure(routes::configure(data.clone()))
    })
    .bind(&address)
    .with_context(|| format!("Failed to bind {address}"))?
    .run()
    .await?;

    log::info!("Currency API stopped");

    Ok(())
}
