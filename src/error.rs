use thiserror::Error;

/// Stratum client error types
#[derive(Error, Debug)]
pub enum StratumError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid share: {0}")]
    InvalidShare(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Session shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, StratumError>;
