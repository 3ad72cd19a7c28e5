//! Error types for the relay core

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The connection was closed or never opened; nothing can be sent
    #[error("Not connected")]
    NotConnected,

    /// Frames were polled from a coordinator that never saw a channel status
    #[error("Coordinator has not been started")]
    NotStarted,

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend behind a relay client failed
    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
