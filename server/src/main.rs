use clap::Parser;
use log::{error, info};
use server::{RelayConfig, RelayServer};
use shared::DEFAULT_PORT;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum number of simultaneous clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Largest incomplete message a client may buffer, in bytes
    #[arg(long, default_value = "65536")]
    max_frame_bytes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let config = RelayConfig {
        bind_addr,
        max_clients: args.max_clients,
        max_frame_bytes: args.max_frame_bytes,
        ..RelayConfig::default()
    };

    let relay = RelayServer::bind(config).await?;
    info!("Starting relay on {}", relay.local_addr()?);

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!("Relay stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
