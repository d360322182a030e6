//! Sending side of a session.
//!
//! A [`FileSender`] owns the channel behind an async mutex, which doubles as
//! the availability gate: concurrent `transmit` calls queue up and run one
//! file at a time. The receiver's per-file EOF acknowledgment is not awaited
//! inside `transmit`; it is collected before the next header or EOT goes out.

use super::channel::Channel;
use super::pipeline::StreamEncoder;
use super::protocol::{Control, FileHeader, Frame, Signal};
use super::utils::{epoch_millis, format_transfer_speed, mime_for_name};
use crate::config::SenderConfig;
use crate::error::{Result, TransferError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    AwaitingReady,
    Streaming,
    AwaitingAck,
}

/// A local file and the name it should get on the receiving side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    pub path: PathBuf,
    /// Forward-slash separated, relative to the receiver's root
    pub name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Use the file's own name as its destination name
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::header(format!("invalid file name: {}", path.display())))?
            .to_string();
        Ok(Self { path, name })
    }

    /// Build the header from filesystem metadata
    pub async fn header(&self) -> Result<FileHeader> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            TransferError::io(format!("failed to stat {}", self.path.display()), e)
        })?;
        let last_modified = metadata.modified().map(epoch_millis).unwrap_or(0);

        Ok(FileHeader {
            name: self.name.clone(),
            size: metadata.len(),
            last_modified,
            mime: mime_for_name(&self.name).to_string(),
        })
    }
}

struct Session<C> {
    channel: C,
    ack_pending: bool,
    ended: bool,
}

pub struct FileSender<C: Channel> {
    session: Mutex<Session<C>>,
    state: watch::Sender<SenderState>,
    config: SenderConfig,
}

impl<C: Channel> FileSender<C> {
    pub fn new(channel: C, config: SenderConfig) -> Self {
        let (state, _) = watch::channel(SenderState::Idle);
        Self {
            session: Mutex::new(Session {
                channel,
                ack_pending: false,
                ended: false,
            }),
            state,
            config,
        }
    }

    pub fn state(&self) -> SenderState {
        *self.state.borrow()
    }

    /// Watch state transitions, e.g. to drive a progress display
    pub fn subscribe(&self) -> watch::Receiver<SenderState> {
        self.state.subscribe()
    }

    /// Send one file. Waits for any transmit already in flight to finish.
    pub async fn transmit(&self, source: &FileSource) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.ended {
            return Err(TransferError::protocol("session already ended"));
        }

        let result = self.transmit_locked(&mut session, source).await;
        if result.is_err() {
            self.state.send_replace(SenderState::Idle);
        }
        result
    }

    /// Send a file under its own file name
    pub async fn transmit_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let source = FileSource::from_path(path.as_ref())?;
        self.transmit(&source).await
    }

    /// Finish the session with EOT. Calling it again is a no-op.
    pub async fn end(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.ended {
            return Ok(());
        }
        session.ended = true;

        self.settle_ack(&mut session).await?;
        session.channel.send(Frame::signal(Signal::Eot)).await?;
        debug!("sent EOT");
        session.channel.close(None).await;
        self.state.send_replace(SenderState::Idle);
        Ok(())
    }

    async fn transmit_locked(&self, session: &mut Session<C>, source: &FileSource) -> Result<()> {
        self.settle_ack(session).await?;

        // No header goes out for a source that cannot be read
        let file = tokio::fs::File::open(&source.path).await.map_err(|e| {
            TransferError::io(format!("failed to open {}", source.path.display()), e)
        })?;
        let header = source.header().await?;
        self.state.send_replace(SenderState::AwaitingReady);
        session.channel.send(Frame::Text(header.to_json()?)).await?;
        debug!(?header, "sent header");

        expect_signal(&mut session.channel, Signal::Ready).await?;
        self.state.send_replace(SenderState::Streaming);

        let started = Instant::now();
        let sent = self.stream_file(&mut session.channel, source, file).await?;

        session.channel.send(Frame::signal(Signal::Eof)).await?;
        session.ack_pending = true;
        self.state.send_replace(SenderState::AwaitingAck);

        info!(
            name = %source.name,
            bytes = header.size,
            compressed = sent,
            speed = %format_transfer_speed(header.size, started.elapsed().as_secs_f64()),
            "file sent"
        );
        Ok(())
    }

    /// Collect the EOF that confirms the previous file was persisted
    async fn settle_ack(&self, session: &mut Session<C>) -> Result<()> {
        if !session.ack_pending {
            return Ok(());
        }
        expect_signal(&mut session.channel, Signal::Eof).await?;
        session.ack_pending = false;
        self.state.send_replace(SenderState::Idle);
        debug!("previous file acknowledged");
        Ok(())
    }

    /// Compress the file onto the channel; returns compressed bytes sent
    async fn stream_file(
        &self,
        channel: &mut C,
        source: &FileSource,
        mut file: tokio::fs::File,
    ) -> Result<u64> {
        let mut encoder = StreamEncoder::new(self.config.compression_level);
        let mut buffer = vec![0u8; self.config.read_chunk];
        let mut sent = 0u64;

        loop {
            let n = file.read(&mut buffer).await.map_err(|e| {
                TransferError::io(format!("failed to read {}", source.path.display()), e)
            })?;
            if n == 0 {
                break;
            }
            let chunk = encoder
                .push(&buffer[..n])
                .map_err(|e| TransferError::io("compression failed", e))?;
            sent += self.send_payload(channel, chunk).await?;
        }

        let tail = encoder
            .finish()
            .map_err(|e| TransferError::io("compression failed", e))?;
        sent += self.send_payload(channel, tail).await?;
        Ok(sent)
    }

    async fn send_payload(&self, channel: &mut C, chunk: Bytes) -> Result<u64> {
        if chunk.is_empty() {
            return Ok(0);
        }
        while channel.buffered_amount() > self.config.buffer_threshold {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        let len = chunk.len() as u64;
        channel.send(Frame::Binary(chunk)).await?;
        Ok(len)
    }
}

/// Wait for the next control message and require it to be `expected`
async fn expect_signal<C: Channel>(channel: &mut C, expected: Signal) -> Result<()> {
    match channel.recv().await? {
        Frame::Text(text) => match Control::decode(text) {
            Control::Signal(signal) if signal == expected => {
                debug!(signal = signal.as_str(), "received signal");
                Ok(())
            }
            Control::Signal(signal) => Err(TransferError::protocol(format!(
                "expected {}, got {}",
                expected.as_str(),
                signal.as_str()
            ))),
            Control::Other(text) => Err(TransferError::protocol(text)),
        },
        Frame::Binary(_) => Err(TransferError::protocol(format!(
            "expected {}, got binary frame",
            expected.as_str()
        ))),
        Frame::Close(Some(reason)) => Err(TransferError::protocol(reason)),
        Frame::Close(None) => Err(TransferError::transport(format!(
            "channel closed while waiting for {}",
            expected.as_str()
        ))),
    }
}
