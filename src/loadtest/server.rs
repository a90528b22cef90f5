use actix_web::{App, HttpServer, middleware, web};
use anyhow::{Context, Result};

use super::{IpGenerator, LoadTestManager, routes};
use crate::{config::LoadTesterConfig, metrics::LoadTestMetrics};

pub async fn run(config: LoadTesterConfig) -> Result<()> {
    let address = config.bind_address();
    let metrics = LoadTestMetrics::new().context("Failed to register load test metrics")?;

    log::info!(
        "Starting load tester on {address}, targeting {}",
        config.target_api_base_url
    );
    if config.ip_spoofing.enabled {
        log::info!(
            "IP spoofing enabled for regions {} ({} address ranges)",
            config.ip_spoofing.regions.join(", "),
            IpGenerator::new(&config.ip_spoofing, false).range_count()
        );
    }

    let manager = web::Data::new(LoadTestManager::new(config, metrics.clone()));
    let metrics = web::Data::new(metrics);
    let shutdown = manager.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .configure(routes::configure(manager.clone(), metrics.clone()))
    })
    .bind(&address)
    .with_context(|| format!("Failed to bind {address}"))?
    .run()
    .await?;

    let stopped = shutdown.stop_all().await;
    log::info!("Load tester stopped ({} tests shut down)", stopped.len());

    Ok(())
}
