use clap::Parser;
use log::{error, info};
use server::config::{ServerConfig, DEFAULT_CONFIG_PATH};
use server::network::Server;
use shared::{MapDescriptor, SERVER_TICK_RATE};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON server configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to bind to, overrides the config file
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Session password, overrides the config file
    #[arg(long)]
    password: Option<String>,

    /// Map descriptor to load, overrides the config file
    #[arg(short, long)]
    map: Option<String>,

    /// Recorder ticks per second used when replaying rounds
    #[arg(short, long, default_value_t = SERVER_TICK_RATE)]
    tick_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ServerConfig::load_or_default(&args.config)?;
    if let Some(host) = args.host {
        config.ip = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if let Some(map) = args.map {
        config.map_path = map;
    }

    let map = MapDescriptor::load(&config.map_path)?;
    info!(
        "Loaded map `{}`: {} rounds, {} ms per round",
        map.name, map.round_count, map.time_limit_ms
    );

    let server = Server::bind(&config, map, args.tick_rate).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
