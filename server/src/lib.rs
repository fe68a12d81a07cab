//! # Catch Server Library
//!
//! The authoritative side of a catcher/runner session. The server seats
//! players into the slots a map defines, relays ready toggles and recorded
//! trajectories between them, and once every trajectory is in, replays the
//! round itself to announce the winner.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! The JSON server configuration: bind address, password, map path.
//!
//! ### Handshake Module (`handshake`)
//! The per-connection password/name exchange that ends in a seat or a
//! rejection (`field_full`, `wrong_password`, `name_taken`).
//!
//! ### Registry Module (`registry`)
//! The session registry and broadcaster:
//! - Seat and role assignment from the map's start positions
//! - Countdown and simulation triggers
//! - Fan-out to everyone or to everyone but the sender
//! - Round bookkeeping and departure announcements
//!
//! ### Network Module (`network`)
//! The TCP accept loop. Each connection gets a worker task running the
//! handshake and the game dispatch loop plus a writer task draining its
//! outbound queue.
//!
//! ## Concurrency
//!
//! All workers share one `Arc<RwLock<SessionRegistry>>`. A worker takes the
//! write guard for each batch of decoded messages, so every check-then-act
//! on the roster happens inside a single critical section. Sockets are only
//! touched by the owning connection's tasks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use shared::MapDescriptor;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::load_or_default("server/server_conf.json")?;
//!     let map = MapDescriptor::load(&config.map_path)?;
//!
//!     let server = Server::bind(&config, map, shared::SERVER_TICK_RATE).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod handshake;
pub mod network;
pub mod registry;
