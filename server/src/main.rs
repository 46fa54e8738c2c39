use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig, ServerMessage};
use shared::DEFAULT_TICK_RATE;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value_t = DEFAULT_TICK_RATE)]
    tick_rate: u32,

    /// Connected players allowed, the host's own slot included
    #[arg(short, long, default_value = "8")]
    max_players: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting server on {}:{}", args.host, args.port);
    info!("Tick rate: {}Hz, max players: {}", args.tick_rate, args.max_players);

    let config = ServerConfig {
        address: args.host,
        port: args.port,
        tick_rate: args.tick_rate,
        max_players: args.max_players,
        ..ServerConfig::default()
    };
    let mut server = Server::new(config).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, ending the session...");
            if let Err(e) = shutdown.send(ServerMessage::Shutdown) {
                error!("Failed to request shutdown: {}", e);
            }
        }
    });

    server.run().await?;

    Ok(())
}
