//! Multi-file upload over a message channel.
//!
//! This module provides:
//! - The wire vocabulary (headers, READY/EOF/EOT signals)
//! - A gzip streaming pipeline with bounded hand-off to a blocking decoder
//! - Path containment for untrusted destination names
//! - Sender and receiver engines that run over any [`Channel`]

pub mod channel;
pub mod constants;
pub mod guard;
pub mod pipeline;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod utils;

// Re-export public API
pub use channel::{Channel, MemoryChannel};
pub use guard::PathGuard;
pub use protocol::{Control, FileHeader, Frame, Signal};
pub use receiver::{FileReceiver, ReceiverState, SessionEnd, SessionSummary};
pub use sender::{FileSender, FileSource, SenderState};
