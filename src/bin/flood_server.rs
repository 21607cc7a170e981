use clap::Parser;
use flood_alert_service::config::FloodConfig;
use flood_alert_service::logging::{self, Component};
use flood_alert_service::server;
use std::path::PathBuf;

/// Flood alert server: evaluates sensor samples and pushes notifications.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file (defaults to $FLOOD_ALERT_CONFIG or ./flood_alert.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port; overrides config and $PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_from_env();

    let mut config = FloodConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.service.port = port;
    }

    logging::info(
        Component::System,
        None,
        &format!("flood alert server v{}", env!("CARGO_PKG_VERSION")),
    );

    server::serve(config).await?;
    Ok(())
}
