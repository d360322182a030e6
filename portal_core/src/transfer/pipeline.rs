//! Streaming gzip on both ends of a transfer.
//!
//! The sender feeds file bytes through [`StreamEncoder`] and forwards
//! whatever compressed output is ready. The receiver writes raw frames into a
//! bounded in-memory pipe; a blocking task on the other side of the pipe
//! decodes and writes to the destination file, so network reads and disk
//! writes make progress independently.

use crate::error::{Result, TransferError};
use bytes::Bytes;
use flate2::Compression;
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::io::SyncIoBridge;
use tracing::debug;

/// Incremental gzip encoder producing payload-sized pieces
pub struct StreamEncoder {
    inner: GzEncoder<Vec<u8>>,
}

impl StreamEncoder {
    pub fn new(level: u32) -> Self {
        Self {
            inner: GzEncoder::new(Vec::new(), Compression::new(level)),
        }
    }

    /// Feed plain bytes; returns the compressed bytes produced so far, which
    /// may be empty while the encoder is still buffering.
    pub fn push(&mut self, data: &[u8]) -> std::io::Result<Bytes> {
        self.inner.write_all(data)?;
        Ok(Bytes::from(std::mem::take(self.inner.get_mut())))
    }

    /// Flush the remaining stream, including the gzip trailer.
    pub fn finish(self) -> std::io::Result<Bytes> {
        self.inner.finish().map(Bytes::from)
    }
}

/// Receiving half of the pipeline for one file
pub struct DecodePipeline {
    input: Option<DuplexStream>,
    decoder: Option<JoinHandle<Result<u64>>>,
    name: String,
}

impl DecodePipeline {
    /// Start decoding into `file`. `name` is only used for error messages.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(file: File, name: &str, capacity: usize) -> Self {
        let (input, output) = tokio::io::duplex(capacity);
        let reader = SyncIoBridge::new(output);
        let task_name = name.to_string();
        debug!(name = %name, capacity, "pipe created");

        let decoder = tokio::task::spawn_blocking(move || decode_into(reader, file, &task_name));

        Self {
            input: Some(input),
            decoder: Some(decoder),
            name: name.to_string(),
        }
    }

    /// Hand one compressed frame to the decoder, waiting while the pipe is full.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Err(TransferError::protocol("pipeline input already closed"));
        };
        if input.write_all(data).await.is_ok() {
            return Ok(());
        }
        // The decoder hung up early, which means it failed; report its error.
        self.input = None;
        match self.join_decoder().await {
            Err(e) => Err(e),
            Ok(_) => Err(TransferError::Decode {
                name: self.name.clone(),
                message: "data after end of compressed stream".to_string(),
            }),
        }
    }

    /// Close the input side and wait until everything has been written out.
    /// Returns the number of decoded bytes.
    pub async fn finish(mut self) -> Result<u64> {
        if let Some(mut input) = self.input.take() {
            let _ = input.shutdown().await;
        }
        self.join_decoder().await
    }

    /// Stop feeding the decoder without treating a short stream as an error.
    pub async fn abandon(mut self) {
        self.input = None;
        if let Err(e) = self.join_decoder().await {
            debug!(name = %self.name, err = %e, "abandoned decoder stopped");
        }
    }

    async fn join_decoder(&mut self) -> Result<u64> {
        let Some(decoder) = self.decoder.take() else {
            return Err(TransferError::protocol("decoder already joined"));
        };
        match decoder.await {
            Ok(result) => result,
            Err(e) => Err(TransferError::io(
                format!("decoder task for {} failed", self.name),
                std::io::Error::other(e),
            )),
        }
    }
}

fn decode_into(reader: SyncIoBridge<DuplexStream>, file: File, name: &str) -> Result<u64> {
    let mut input = BufReader::new(reader);
    let mut output = BufWriter::new(file);

    // A payload with no bytes at all is an empty file
    let empty = input
        .fill_buf()
        .map_err(|e| TransferError::io(format!("failed to read payload of {}", name), e))?
        .is_empty();

    let written = if empty {
        0
    } else {
        // Concatenated gzip members form one payload
        let mut decoder = MultiGzDecoder::new(input);
        std::io::copy(&mut decoder, &mut output).map_err(|e| TransferError::Decode {
            name: name.to_string(),
            message: e.to_string(),
        })?
    };

    output
        .flush()
        .map_err(|e| TransferError::io(format!("failed to write {}", name), e))?;
    let file = output
        .into_inner()
        .map_err(|e| TransferError::io(format!("failed to write {}", name), e.into_error()))?;
    file.sync_all()
        .map_err(|e| TransferError::io(format!("failed to sync {}", name), e))?;

    debug!(name = %name, bytes = written, "decoder drained");
    Ok(written)
}
