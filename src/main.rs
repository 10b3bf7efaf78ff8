use anyhow::Result;
use api_throttler::config::Config;
use api_throttler::server::Server;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "api-throttler", version, about = "API admission control service")]
struct Cli {
    /// JSON throttle settings file (overrides THROTTLE_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Validate the throttle settings and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(path) = cli.config {
        config.throttle_config = Some(path);
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("api_throttler={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.check_config {
        let settings = config.throttle_settings()?;
        settings.check()?;
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    tracing::info!("Starting api-throttler");
    tracing::info!(
        bind_addr = %config.bind_addr,
        api_prefix = %config.api_prefix,
        inventory_prefix = %config.inventory_prefix,
        "Configuration loaded"
    );

    let server = Server::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create server: {}", e))?;

    server
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
