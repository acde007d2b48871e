use std::io;
use thiserror::Error;

/// Custom error types for the SimpleBee protocol
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Checksum mismatch: computed {computed:02X?}, received {received:02X?}")]
    Checksum {
        computed: [u8; 2],
        received: [u8; 2],
    },

    #[error("Unknown message type code: 0x{0:02X}")]
    UnknownType(u8),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timing error: {0}")]
    Timing(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new frame error
    pub fn frame(msg: impl Into<String>) -> Self {
        Error::Frame(msg.into())
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new timing error
    pub fn timing(msg: impl Into<String>) -> Self {
        Error::Timing(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}
