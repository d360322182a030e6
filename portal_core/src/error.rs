//! Error taxonomy for a transfer session.
//!
//! Every variant is Session-fatal: the engines report it to the peer on a
//! best-effort basis and stop. Nothing in here is retried automatically.

use thiserror::Error;

/// Errors produced by the sender and receiver engines.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The header message was malformed, empty, or arrived out of place.
    #[error("invalid header: {message}")]
    Header { message: String },

    /// A destination resolved outside the configured root.
    #[error("path escapes root: {name}")]
    PathViolation { name: String },

    /// Local filesystem failure (directory creation, file open, write).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The compressed payload of the current file was truncated or corrupt.
    #[error("failed to decode {name}: {message}")]
    Decode { name: String, message: String },

    /// The peer sent something the protocol does not allow at this point.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// The channel failed or closed underneath the session.
    #[error("transport error: {message}")]
    Transport { message: String },
}

impl TransferError {
    pub fn header(message: impl Into<String>) -> Self {
        Self::Header {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short stable name of the variant, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Header { .. } => "header",
            Self::PathViolation { .. } => "path_violation",
            Self::Io { .. } => "io",
            Self::Decode { .. } => "decode",
            Self::Protocol { .. } => "protocol",
            Self::Transport { .. } => "transport",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
