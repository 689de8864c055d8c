//! Error types for the state manager

use shared_types::RegisterError;
use thiserror::Error;

use crate::domain::MessageType;

/// Framing and message decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed mid-frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed {message_type} message: {reason}")]
    Malformed {
        message_type: MessageType,
        reason: String,
    },

    #[error("Unexpected message type from client: {0}")]
    UnexpectedType(MessageType),
}

impl ProtocolError {
    pub(crate) fn malformed(message_type: MessageType, reason: impl Into<String>) -> Self {
        Self::Malformed {
            message_type,
            reason: reason.into(),
        }
    }
}

/// Server and client session errors.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Register error while handling {message_type}: {source}")]
    Register {
        message_type: MessageType,
        #[source]
        source: RegisterError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unexpected response to {request}: {reason}")]
    UnexpectedResponse {
        request: MessageType,
        reason: String,
    },

    #[error("Server closed the connection")]
    ConnectionClosed,
}

impl From<ManagerError> for RegisterError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::Register { source, .. } => source,
            other => RegisterError::Remote(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ManagerError>;
