use crate::error::{Result, TransferError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One message as delivered by a transport channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Control message: a header, a signal, or error text
    Text(String),
    /// Compressed payload bytes; boundaries carry no meaning
    Binary(Bytes),
    /// Peer closed the channel, optionally with a reason
    Close(Option<String>),
}

impl Frame {
    pub fn signal(signal: Signal) -> Self {
        Frame::Text(signal.as_str().to_string())
    }
}

/// Control tokens exchanged between sender and receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Ready,
    Eof,
    Eot,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Ready => "READY",
            Signal::Eof => "EOF",
            Signal::Eot => "EOT",
        }
    }
}

/// A decoded text message.
///
/// Text is matched against the fixed literal set first; whatever is left is
/// handed back untouched so the caller can treat it as a header or as error
/// text depending on its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Signal(Signal),
    Other(String),
}

impl Control {
    pub fn decode(text: String) -> Self {
        match text.as_str() {
            "READY" => Control::Signal(Signal::Ready),
            "EOF" => Control::Signal(Signal::Eof),
            "EOT" => Control::Signal(Signal::Eot),
            _ => Control::Other(text),
        }
    }
}

/// Per-file metadata sent ahead of the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    /// Forward-slash separated path relative to the receiver's root
    pub name: String,
    /// Uncompressed length as declared by the sender (never verified)
    #[serde(default)]
    pub size: u64,
    /// Epoch milliseconds
    pub last_modified: i64,
    #[serde(default)]
    pub mime: String,
}

impl FileHeader {
    /// Parse a header from a text message
    pub fn parse(text: &str) -> Result<Self> {
        let header: FileHeader = serde_json::from_str(text)
            .map_err(|e| TransferError::header(format!("failed to parse header: {}", e)))?;
        if header.name.is_empty() {
            return Err(TransferError::header("received header with empty name"));
        }
        Ok(header)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| TransferError::header(format!("failed to serialize header: {}", e)))
    }

    /// `last_modified` as a point in time; pre-epoch values are honoured
    pub fn modified_time(&self) -> SystemTime {
        let millis = self.last_modified;
        if millis >= 0 {
            UNIX_EPOCH + Duration::from_millis(millis as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
        }
    }
}
