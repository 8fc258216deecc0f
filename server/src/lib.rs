//! # Match Server Library
//!
//! This library provides the authoritative server for backgammon, acey-deucey
//! and tabula matches played over a line-based TCP protocol. Rules live in the
//! `shared` crate; this crate owns connections, matches and the order in which
//! commands are applied.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Match State
//! Every roll, move, double and resignation is validated and applied here.
//! Clients only ever see projections of the server's state, expressed from
//! their own side of the board.
//!
//! ### Client Management
//! Handles the complete lifecycle of a connection:
//! - Login as a guest or a registered account
//! - Seating in a match, spectating and leaving
//! - Rejoining a seat by display name after a disconnect
//! - Dropping peers that stop reading their output
//!
//! ### Event Delivery
//! Each connection chooses human-readable text or JSON. Events are encoded per
//! recipient and queued on a bounded per-connection buffer.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Dispatch
//! Connection tasks never touch shared state. They push raw lines onto one
//! bounded command queue, and a single dispatcher applies them in order. Two
//! commands are never interleaved, so matches need no locks of their own.
//! The client and match registries sit behind `RwLock`s only so that
//! administrative callers can read them while the server runs.
//!
//! ### Per-Connection Task Pair
//! Each TCP connection gets a read task and a write task. The write task
//! enforces a per-line deadline; when the peer hangs up, pending output gets
//! a short grace period to drain before the connection is torn down.
//!
//! ## Module Organization
//!
//! ### Configuration (`config`)
//! Runtime settings with defaults used by tests and the binary.
//!
//! ### Collaborators (`collaborators`)
//! Traits for account storage and result recording, plus the in-memory
//! implementations the server ships with.
//!
//! ### Client Manager (`client_manager`)
//! Registry of live connections and their outbound queues.
//!
//! ### Matches (`match_manager`, `coordinator`)
//! Registry of open matches, and the coordinator binding one match to the
//! players and spectators attached to it.
//!
//! ### Dispatcher (`dispatcher`)
//! The single worker that turns commands into state transitions and events.
//!
//! ### Network (`network`)
//! TCP accept loop, per-connection read and write tasks, and the dispatch loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let server = Server::new(ServerConfig::with_address("127.0.0.1:1337")).await?;
//!
//!     // Runs until shut down through a `ServerHandle`, or until an
//!     // invariant violation stops the dispatcher.
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod match_manager;
pub mod network;
pub mod utils;
