//! Relay Core Library
//!
//! Protocol, dispatch and peer coordination for the relay client.
//!
//! # Architecture
//!
//! - **Codec**: quote-escaped token lines for structured message bodies
//! - **Protocol**: single-symbol line format spoken with the relay
//! - **Dispatcher**: routes inbound lines to an optional-callback handler
//! - **Peer**: elects one host per realm and shards full realms
//!
//! # Usage
//!
//! ```ignore
//! let coordinator = PeerCoordinator::new(RealmOptions::sharded(1, 8));
//! let mut dispatcher = Dispatcher::new(coordinator, sink);
//!
//! while let Some(event) = events.recv().await {
//!     dispatcher.handle_event(event)?;
//!     while let Some(frame) = dispatcher.handler_mut().next_frame()? {
//!         /* handle */
//!     }
//! }
//! ```

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod handler;
pub mod peer;
pub mod protocol;

#[cfg(test)]
mod testing;

pub use dispatcher::{Dispatcher, LineSink, TransportEvent};
pub use error::{Error, Result};
pub use frame::{ChannelFrame, FrameKind};
pub use handler::{ChannelHandler, CommandHandler, Commands, RelayClient};
pub use peer::{ChildRealmPolicy, NegotiationState, PeerCoordinator, RealmOptions};
pub use protocol::{
    ChannelStatus, Inbound, MessageTarget, Outbound, RealmNumber, RealmType, UserNumber,
};
