//! Receiving side of a session.
//!
//! One [`FileReceiver`] owns one channel. Files are handled strictly one at
//! a time: header, READY, payload frames, EOF, and only then the next header.

use super::channel::Channel;
use super::guard::PathGuard;
use super::pipeline::DecodePipeline;
use super::protocol::{Control, FileHeader, Frame, Signal};
use super::utils::{format_transfer_speed, open_destination};
use crate::TransferEvent;
use crate::config::ReceiverConfig;
use crate::error::{Result, TransferError};
use filetime::FileTime;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    AwaitingHeader,
    AwaitingChunks,
    Draining,
    Done,
}

/// How a session that did not fail came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionEnd {
    /// The sender said EOT
    #[default]
    Eot,
    /// The channel closed between files
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Files fully persisted
    pub files: usize,
    /// Decoded bytes written across those files
    pub bytes_written: u64,
    pub end: SessionEnd,
}

enum HeaderRead {
    Header(FileHeader),
    End(SessionEnd),
}

enum FileOutcome {
    Persisted(u64),
    /// EOT arrived mid-file; the partial file stays on disk
    Interrupted,
}

pub struct FileReceiver<C: Channel> {
    channel: C,
    guard: Arc<PathGuard>,
    config: ReceiverConfig,
    events: Option<mpsc::Sender<TransferEvent>>,
    state: ReceiverState,
}

impl<C: Channel> FileReceiver<C> {
    pub fn new(channel: C, guard: Arc<PathGuard>, config: ReceiverConfig) -> Self {
        Self {
            channel,
            guard,
            config,
            events: None,
            state: ReceiverState::AwaitingHeader,
        }
    }

    /// Report progress to `tx` as files come and go
    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Serve the session until EOT, channel close, or the first error.
    ///
    /// Errors are reported to the peer before they are returned.
    pub async fn run(mut self) -> Result<SessionSummary> {
        let result = self.serve().await;
        self.state = ReceiverState::Done;

        match result {
            Ok(summary) => {
                info!(
                    files = summary.files,
                    bytes = summary.bytes_written,
                    end = ?summary.end,
                    "portal session finished"
                );
                self.channel.close(None).await;
                self.emit(TransferEvent::SessionEnded {
                    files: summary.files,
                })
                .await;
                Ok(summary)
            }
            Err(e) => {
                error!(kind = e.kind(), err = %e, "portal protocol failed");
                let message = e.to_string();
                let _ = self.channel.send(Frame::Text(message.clone())).await;
                self.channel.close(Some(message.clone())).await;
                self.emit(TransferEvent::SessionFailed { error: message })
                    .await;
                Err(e)
            }
        }
    }

    async fn serve(&mut self) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();

        loop {
            self.state = ReceiverState::AwaitingHeader;
            let header = match self.read_header().await? {
                HeaderRead::Header(header) => header,
                HeaderRead::End(end) => {
                    summary.end = end;
                    return Ok(summary);
                }
            };

            match self.receive_file(&header).await? {
                FileOutcome::Persisted(bytes) => {
                    summary.files += 1;
                    summary.bytes_written += bytes;
                }
                FileOutcome::Interrupted => {
                    summary.end = SessionEnd::Eot;
                    return Ok(summary);
                }
            }
        }
    }

    async fn read_header(&mut self) -> Result<HeaderRead> {
        match self.channel.recv().await? {
            Frame::Text(text) => match Control::decode(text) {
                Control::Signal(Signal::Eot) => {
                    debug!("received EOT");
                    Ok(HeaderRead::End(SessionEnd::Eot))
                }
                Control::Signal(signal) => Err(TransferError::header(format!(
                    "expected header, got {}",
                    signal.as_str()
                ))),
                Control::Other(text) => {
                    let header = FileHeader::parse(&text)?;
                    debug!(?header, "received header");
                    Ok(HeaderRead::Header(header))
                }
            },
            Frame::Binary(data) => Err(TransferError::header(format!(
                "expected header, got {} bytes of payload",
                data.len()
            ))),
            Frame::Close(reason) => {
                debug!(reason = ?reason, "channel closed while awaiting header");
                Ok(HeaderRead::End(SessionEnd::Closed))
            }
        }
    }

    async fn receive_file(&mut self, header: &FileHeader) -> Result<FileOutcome> {
        let path = self.guard.resolve(&header.name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TransferError::io(
                    format!("failed to create parent directory {}", parent.display()),
                    e,
                )
            })?;
        }
        let file = open_destination(&path)
            .await
            .map_err(|e| TransferError::io(format!("failed to create file {}", path.display()), e))?
            .into_std()
            .await;
        debug!(path = %path.display(), "file created");

        self.channel.send(Frame::signal(Signal::Ready)).await?;
        self.state = ReceiverState::AwaitingChunks;
        self.emit(TransferEvent::FileStarted {
            name: header.name.clone(),
            size: header.size,
        })
        .await;

        let started = Instant::now();
        let mut pipeline = DecodePipeline::start(file, &header.name, self.config.pipe_capacity);

        loop {
            let frame = match self.channel.recv().await {
                Ok(frame) => frame,
                Err(e) => {
                    pipeline.abandon().await;
                    return Err(e);
                }
            };

            match frame {
                Frame::Binary(data) => pipeline.write(&data).await?,
                Frame::Text(text) => match Control::decode(text) {
                    Control::Signal(Signal::Eof) => {
                        debug!(name = %header.name, "received EOF");
                        break;
                    }
                    Control::Signal(Signal::Eot) => {
                        info!(
                            name = %header.name,
                            "received EOT mid-file, leaving partial file in place"
                        );
                        pipeline.abandon().await;
                        return Ok(FileOutcome::Interrupted);
                    }
                    Control::Signal(signal) => {
                        pipeline.abandon().await;
                        return Err(invalid_framing(&header.name, signal.as_str()));
                    }
                    Control::Other(text) => {
                        pipeline.abandon().await;
                        return Err(invalid_framing(&header.name, &text));
                    }
                },
                Frame::Close(reason) => {
                    pipeline.abandon().await;
                    return Err(TransferError::transport(format!(
                        "channel closed while receiving {} ({})",
                        header.name,
                        reason.as_deref().unwrap_or("no reason")
                    )));
                }
            }
        }

        self.state = ReceiverState::Draining;
        let bytes = pipeline.finish().await?;
        apply_mtime(&path, header);

        self.channel.send(Frame::signal(Signal::Eof)).await?;

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            dst = %path.display(),
            bytes,
            speed = %format_transfer_speed(bytes, elapsed),
            "successfully copied file"
        );
        self.emit(TransferEvent::FileCompleted {
            name: header.name.clone(),
            path,
            bytes,
        })
        .await;

        Ok(FileOutcome::Persisted(bytes))
    }

    /// `&mut self`: the session future must stay `Send` over channels that
    /// are not `Sync`, such as axum's `WebSocket`
    async fn emit(&mut self, event: TransferEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

fn invalid_framing(name: &str, text: &str) -> TransferError {
    TransferError::io(
        format!("invalid framing while receiving {}", name),
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unexpected text message {:?}", text),
        ),
    )
}

/// Stamp the finished file with the sender's modification time
fn apply_mtime(path: &Path, header: &FileHeader) {
    let time = FileTime::from_system_time(header.modified_time());
    debug!(file = %path.display(), last_modified = header.last_modified, "set last modified time");
    if let Err(e) = filetime::set_file_times(path, time, time) {
        warn!(file = %path.display(), err = %e, "failed to set last modified time");
    }
}
