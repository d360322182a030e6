use std::time::Duration;

/// Default port for the upload server (0 = pick any free port)
pub const DEFAULT_PORT: u16 = 0;

/// Sender suspends while more than this many bytes are queued on the channel (2MB)
pub const SEND_BUFFER_THRESHOLD: usize = 2 * 1024 * 1024;

/// How often a suspended sender re-checks the channel's queue
pub const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Chunk size used when reading source files (64KB)
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Capacity of the hand-off between the message loop and the decoder (64KB)
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Gzip level used by the sender
pub const COMPRESSION_LEVEL: u32 = 6;

/// Time given to the peer to read an error before the socket is dropped
pub const CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Longest close reason a WebSocket close frame can carry
pub const MAX_CLOSE_REASON: usize = 123;
