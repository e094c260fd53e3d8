//! Error types shared by the relay pipeline and the vendor clients.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Client disconnected or the socket failed. Triggers a normal drain.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transcoder failed to start, crashed or did not exit.
    #[error("Transcoder process error: {0}")]
    Process(String),

    #[error("Transcoder process unavailable: {0}")]
    ProcessUnavailable(String),

    /// A cloud API call failed or returned an error payload.
    #[error("Vendor API error: {0}")]
    Vendor(String),

    /// Malformed inbound payload.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Relay queue already received its end marker")]
    QueueClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Vendor(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
