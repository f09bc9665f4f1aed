//! Error handling for the chat relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone)]
pub enum RelayError {
    /// Network-related errors (bind, read, write)
    Network(String),
    /// Per-connection errors (peer close, broken transport)
    Connection(String),
    /// Protocol errors (malformed or oversized client input)
    Protocol(String),
    /// Requested room does not exist
    RoomNotFound(String),
    /// Requested room is at capacity
    RoomFull(String),
    /// Configuration error (load, validation, rejected reload)
    Config(String),
}

impl RelayError {
    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        RelayError::Network(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        RelayError::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        RelayError::Protocol(msg.into())
    }

    /// Create a room not found error
    pub fn room_not_found<T: Into<String>>(msg: T) -> Self {
        RelayError::RoomNotFound(msg.into())
    }

    /// Create a room full error
    pub fn room_full<T: Into<String>>(msg: T) -> Self {
        RelayError::RoomFull(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Network(msg) => write!(f, "Network error: {}", msg),
            RelayError::Connection(msg) => write!(f, "Connection error: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            RelayError::RoomNotFound(msg) => write!(f, "Room not found: {}", msg),
            RelayError::RoomFull(msg) => write!(f, "Room full: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Config(format!("JSON error: {}", err))
    }
}

impl From<tokio_util::codec::LinesCodecError> for RelayError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                RelayError::Protocol("line exceeds maximum length".to_string())
            }
            tokio_util::codec::LinesCodecError::Io(e) => e.into(),
        }
    }
}
