use anyhow::Result;
use valut::config::{self, LoadTesterConfig};

#[actix_web::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = LoadTesterConfig::from_env()?;
    valut::loadtest::server::run(config).await
}
