//! # Kitchen Client Library
//!
//! Client side of the cooperative kitchen game: a mirror of the server world,
//! local prediction with reconciliation for the player's own movement,
//! optimistic interactions, delayed interpolation for everyone else, and a
//! small debug renderer.
//!
//! ## Data flow
//!
//! Frames from the [`network`] thread are fed to
//! [`game::ClientGameState::handle_frame`]. Snapshots and deltas update the
//! confirmed [`mirror::RemoteWorld`], which maps server entity ids to local
//! ones. State broadcasts reconcile the local player through
//! [`prediction::Predictor`] and feed remote positions into
//! [`interpolation::Interpolator`]. After every confirmed update the
//! predicted world is rebuilt as a copy of the confirmed world with the
//! player's unacknowledged interactions replayed on top.
//!
//! Movement uses the same step function and collider as the server, which is
//! what makes replay after a correction land where the prediction did.
//!
//! ## Modules
//!
//! - [`mirror`]: confirmed world and server to local id map
//! - [`prediction`]: pending inputs, replay and correction smoothing
//! - [`interpolation`]: per-entity position histories
//! - [`game`]: ties the above together and produces render data
//! - [`input`]: keyboard sampling with edge detection
//! - [`network`]: TCP transport on a background thread
//! - [`rendering`]: macroquad drawing
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientGameState;
//! use client::network::{NetworkClient, NetworkEvent};
//! use shared::movement::InputFlags;
//!
//! let mut network = NetworkClient::connect("127.0.0.1:8080").unwrap();
//! let mut game = ClientGameState::default();
//!
//! for event in network.poll() {
//!     if let NetworkEvent::Frame(frame) = event {
//!         game.handle_frame(frame, 0.0);
//!     }
//! }
//! if let Some(command) = game.apply_local_input(InputFlags(InputFlags::RIGHT), 16.0) {
//!     network.send(command);
//! }
//! let _entities = game.render_entities(0.0);
//! ```

pub mod game;
pub mod input;
pub mod interpolation;
pub mod mirror;
pub mod network;
pub mod prediction;
pub mod rendering;
