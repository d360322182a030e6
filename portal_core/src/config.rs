use crate::transfer::constants::{
    BACKPRESSURE_POLL_INTERVAL, COMPRESSION_LEVEL, DEFAULT_PORT, PIPE_CAPACITY, READ_CHUNK_SIZE,
    SEND_BUFFER_THRESHOLD,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PORT: &str = "PORTAL_PORT";
const ENV_ROOT: &str = "PORTAL_ROOT";
const ENV_DEBUG: &str = "PORTAL_DEBUG";

/// Settings for the upload server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port to listen on, 0 picks a free one
    pub port: u16,
    /// Directory uploads are written under
    pub root: PathBuf,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `PORTAL_*` variables (a `.env` file is honoured)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid {}: {}", ENV_PORT, port))?;
        }
        if let Some(root) = lookup(ENV_ROOT) {
            config.root = PathBuf::from(root);
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            config.debug = matches!(debug.trim(), "1" | "true" | "yes" | "on");
        }

        Ok(config)
    }
}

/// Create `root` if needed and return its canonical absolute form
pub fn prepare_root(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create directory {}", root.display()))?;
    std::fs::canonicalize(root)
        .with_context(|| format!("failed to resolve directory {}", root.display()))
}

/// Tuning for the sending side of a session
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Suspend sending while more than this many bytes are queued
    pub buffer_threshold: usize,
    pub poll_interval: Duration,
    pub read_chunk: usize,
    pub compression_level: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            buffer_threshold: SEND_BUFFER_THRESHOLD,
            poll_interval: BACKPRESSURE_POLL_INTERVAL,
            read_chunk: READ_CHUNK_SIZE,
            compression_level: COMPRESSION_LEVEL,
        }
    }
}

/// Tuning for the receiving side of a session
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Bytes that may sit between the message loop and the decoder
    pub pipe_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: PIPE_CAPACITY,
        }
    }
}
