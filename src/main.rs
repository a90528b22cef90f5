use anyhow::Result;
use valut::config::{self, ApiConfig};

#[actix_web::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ApiConfig::from_env()?;
    valut::server::run(config).await
}
