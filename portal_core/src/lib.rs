use std::path::PathBuf;

pub mod config;
pub mod error;
pub mod http_share;
pub mod transfer;

pub use error::TransferError;
pub use transfer::{
    Channel, FileHeader, FileReceiver, FileSender, FileSource, Frame, MemoryChannel, PathGuard,
    SessionEnd, SessionSummary, Signal,
};

/// Progress report from a receiving session to the embedding application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Header accepted and READY sent
    FileStarted { name: String, size: u64 },

    /// File fully decoded, closed, and timestamped
    FileCompleted {
        name: String,
        path: PathBuf,
        bytes: u64,
    },

    /// Session ended by EOT or a clean close
    SessionEnded { files: usize },

    /// Session ended by an error; the peer has been told
    SessionFailed { error: String },
}
