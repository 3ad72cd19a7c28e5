//! Relay Network Library
//!
//! Runs a [`relay_core::Dispatcher`] over a real or simulated relay.
//!
//! # Architecture
//!
//! - **Transport**: TCP connection task exchanging newline-delimited lines
//! - **Offline**: one-user relay simulator with delayed replies
//! - **Store**: SQLite-backed realm data for the simulator
//!
//! # Usage
//!
//! ```ignore
//! // Live relay
//! let (writer, mut events) = transport::connect(("relay.example", DEFAULT_PORT)).await?;
//! let mut dispatcher = Dispatcher::new(PeerCoordinator::new(options), writer);
//! while let Some(event) = events.recv().await {
//!     dispatcher.handle_event(event)?;
//! }
//!
//! // No relay at all
//! let mut relay = OfflineRelay::new(PeerCoordinator::new(options), OfflineOptions::default())?;
//! relay.start();
//! while relay.step().await? {
//!     /* poll frames */
//! }
//! ```

pub mod error;
mod line;
pub mod offline;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
pub use line::MAX_LINE_LENGTH;
pub use offline::{OfflineOptions, OfflineRelay, DEFAULT_PING, OFFLINE_USER_NUMBER};
pub use store::DataStore;
pub use transport::{connect, spawn_connection, LineWriter};

/// Default port for relay servers
pub const DEFAULT_PORT: u16 = 7331;
