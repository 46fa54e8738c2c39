use clap::Parser;
use client::network::{Client, ClientConfig};
use log::info;
use rand::Rng;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Host port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Name shown to other players
    #[arg(short, long, default_value = "Player")]
    name: String,

    /// Stable identity used to find a previous session; random if omitted
    #[arg(long)]
    player_id: Option<String>,

    /// Reconnection attempts after losing the host
    #[arg(short, long, default_value = "2")]
    reconnect_attempts: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let player_id = args
        .player_id
        .unwrap_or_else(|| format!("player-{:08x}", rand::thread_rng().gen::<u32>()));

    info!("Starting client as {} ({})", args.name, player_id);

    let mut client = Client::new(ClientConfig {
        address: args.host,
        port: args.port,
        player_id,
        player_name: args.name,
        reconnect_attempts: args.reconnect_attempts,
        ..ClientConfig::default()
    });

    client.run().await?;

    if let Some(status) = client.last_status() {
        info!("Session ended: {}", status);
    }

    Ok(())
}
