//! # Kitchen Server Library
//!
//! Authoritative server for the cooperative kitchen game. It owns the only
//! writable copy of the world, consumes queued client commands once per tick
//! and streams snapshots, deltas and positional state back to every client.
//!
//! ## Tick pipeline
//!
//! Each tick runs, in order: departures (held items released before the
//! player is destroyed), joins (player spawned, welcome and snapshot sent),
//! every queued movement command per connection, at most one interact press
//! per player, cooking, the order policy, held item carry, the placement
//! repair pass, and finally a delta plus a state broadcast per connection.
//!
//! Receive tasks never touch the world; they only enqueue into
//! [`client_manager::Connection`] buffers through the main loop.
//!
//! ## Modules
//!
//! - [`config`]: command line arguments and [`config::ServerConfig`]
//! - [`level`]: kitchen layout seeding
//! - [`client_manager`]: per-connection queues, acks and delta cursors
//! - [`game`]: world ownership and the simulation steps of a tick
//! - [`orders`]: order spawn and timeout policy
//! - [`network`]: TCP framing, connection tasks and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod level;
pub mod network;
pub mod orders;
