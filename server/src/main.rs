use clap::Parser;
use log::info;
use server::{RelayConfig, Server};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "256")]
    max_connections: usize,

    /// Seconds between heartbeat pings
    #[arg(long, default_value = "30")]
    heartbeat_secs: u64,

    /// Minimum milliseconds between two position broadcasts of one player
    #[arg(long, default_value = "100")]
    broadcast_interval_ms: u64,

    /// Minimum milliseconds between two messages from one connection
    #[arg(long, default_value = "50")]
    inbound_spacing_ms: u64,
}

impl Args {
    fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_connections: self.max_connections,
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            inbound_spacing: Duration::from_millis(self.inbound_spacing_ms),
            ..RelayConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting relay on {}", address);
    let server = Server::bind(&address, args.relay_config()).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await?;

    Ok(())
}
