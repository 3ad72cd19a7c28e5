//! Application error types

use std::process::ExitCode;

/// Application result type
pub type Result<T> = std::result::Result<T, Error>;

/// Application errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Net(#[from] relay_net::Error),

    #[error(transparent)]
    Core(#[from] relay_core::Error),
}

impl Error {
    /// Process exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Error::Config(_) | Error::ConfigParse(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}
