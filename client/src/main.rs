use clap::Parser;
use client::network::{Client, ClientConfig};
use log::{error, info};
use shared::{COUNTDOWN_TIME_MS, DEFAULT_PORT, SERVER_TICK_RATE};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("localhost:{}", DEFAULT_PORT))]
    server: String,

    /// Session password
    #[arg(short, long, default_value = "")]
    password: String,

    /// Display name, unique among seated players
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Connect timeout in milliseconds
    #[arg(long, default_value = "5000")]
    connect_timeout_ms: u64,

    /// Times to re-issue `connect` when the field is full
    #[arg(short, long, default_value = "0")]
    retries: u32,

    /// Leave after this many rounds
    #[arg(long, default_value = "1")]
    rounds: u32,

    /// Countdown before each action phase, in milliseconds
    #[arg(long, default_value_t = COUNTDOWN_TIME_MS)]
    countdown_ms: f32,

    /// Server tick rate the recorder samples at
    #[arg(short, long, default_value_t = SERVER_TICK_RATE)]
    tick_rate: u32,

    /// Seed for the wandering body
    #[arg(long, default_value = "0")]
    seed: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ClientConfig {
        server: args.server,
        password: args.password,
        name: args.name,
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        retries: args.retries,
        rounds: args.rounds,
        countdown_ms: args.countdown_ms,
        tick_rate: args.tick_rate,
        seed: args.seed,
    };

    info!("Starting client {} for {} round(s)", config.name, config.rounds);
    let mut client = Client::new(config);

    match client.run().await {
        Ok(results) => {
            for result in results {
                println!(
                    "Round {}: {} won{}",
                    result.round,
                    result.winner,
                    if result.collision { " by catching" } else { "" }
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            let status = client.session().read().await.status().to_string();
            eprintln!("{}", status);
            Err(e.into())
        }
    }
}
