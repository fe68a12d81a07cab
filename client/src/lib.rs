//! # Catch Client Library
//!
//! The player side of a catcher/runner session. A client connects, answers
//! the server's handshake prompts, mirrors the roster the server announces,
//! and runs each round through its phase machine: it records the local
//! trajectory during the action phase, submits it, and once every other
//! player's trajectory has arrived replays the round locally.
//!
//! ## Module Organization
//!
//! ### Handshake Module (`handshake`)
//! Answers `request_password` and `request_name`, tracks the assigned uuid
//! and keeps a human readable status line.
//!
//! ### Session Module (`session`)
//! The mirrored registry: map, own seat, remote players with their ready
//! flags and trajectories. Incoming game messages become [`session::SessionEvent`]s
//! for the main tick.
//!
//! ### Phase Module (`phase`)
//! `Preparing -> Countdown -> Action -> AfterAction -> Simulation -> Results`,
//! driving the movement recorder and the local replay.
//!
//! ### Body Module (`body`)
//! The locally controlled body the recorder samples. The headless client
//! uses a seeded wandering body.
//!
//! ### Network Module (`network`)
//! Connection establishment with distinct failure reasons, the receive task
//! feeding the session, the outbound queue and the frame loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         server: "localhost:19560".to_string(),
//!         name: "alice".to_string(),
//!         ..ClientConfig::default()
//!     };
//!
//!     let results = Client::new(config).run().await?;
//!     for result in results {
//!         println!("round {}: {} won", result.round, result.winner);
//!     }
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod handshake;
pub mod network;
pub mod phase;
pub mod session;
