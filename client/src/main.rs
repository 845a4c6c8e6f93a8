use clap::Parser;
use client::avatar::WanderingAvatar;
use client::network::{self, ClientCommand, ClientConfig, SessionError};
use client::Client;
use log::{error, info};
use shared::MapId;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay URL to connect to
    #[arg(short = 's', long, default_value = network::DEFAULT_SERVER_URL)]
    server: String,

    /// Display name of the local player
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Map to join, as a number or numeric string
    #[arg(short, long, default_value = "100000000")]
    map: MapId,

    /// Seed for the wandering avatar; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "5")]
    max_reconnects: u32,

    /// Seconds between reconnect attempts
    #[arg(long, default_value = "3")]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(rand::random);

    info!("Starting client...");
    info!("Joining map {} as {} (seed {})", args.map, args.name, seed);
    info!("Type a line and press Enter to chat");

    let config = ClientConfig {
        server_url: args.server.clone(),
        max_reconnects: args.max_reconnects,
        reconnect_interval: Duration::from_secs(args.reconnect_secs),
        ..Default::default()
    };
    let avatar = WanderingAvatar::new(&args.name, args.map, seed);
    let mut client = Client::new(config, avatar);

    let commands = client.commands();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if commands.send(ClientCommand::Chat(line.to_string())).is_err() {
                break;
            }
        }
    });

    let result = client
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down...");
        })
        .await;

    match result {
        Err(e @ SessionError::ConnectionFailed { .. }) => {
            error!("Connection failed: {}", e);
            Err(e.into())
        }
        other => Ok(other?),
    }
}
