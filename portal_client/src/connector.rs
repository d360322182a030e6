//! Client side of the upload WebSocket

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use portal_core::error::{Result, TransferError};
use portal_core::transfer::channel::{frame_len, truncate_reason};
use portal_core::transfer::{Channel, Frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected upload WebSocket.
///
/// Outgoing frames are queued to a writer task, so `send` returns as soon as
/// a frame is queued and `buffered_amount` reports what has not been
/// written to the socket yet.
pub struct WsClientChannel {
    tx: Option<mpsc::UnboundedSender<(Message, usize)>>,
    stream: SplitStream<WsStream>,
    buffered: Arc<AtomicUsize>,
    writer: Option<JoinHandle<()>>,
}

impl WsClientChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransferError::transport(format!("failed to connect to {}: {}", url, e)))?;
        info!("Connected to {}", url);

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        let writer = tokio::spawn(write_loop(sink, rx, buffered.clone()));

        Ok(Self {
            tx: Some(tx),
            stream,
            buffered,
            writer: Some(writer),
        })
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<(Message, usize)>,
    buffered: Arc<AtomicUsize>,
) {
    while let Some((message, len)) = rx.recv().await {
        let result = sink.send(message).await;
        buffered.fetch_sub(len, Ordering::SeqCst);
        if let Err(e) = result {
            debug!("websocket write failed: {}", e);
            break;
        }
    }
    // Nothing queued will ever drain now
    rx.close();
    buffered.store(0, Ordering::SeqCst);
    let _ = sink.close().await;
}

impl Channel for WsClientChannel {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let len = frame_len(&frame);
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close(reason) => {
                self.close(reason).await;
                return Ok(());
            }
        };
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransferError::transport("websocket is closed"))?;

        self.buffered.fetch_add(len, Ordering::SeqCst);
        tx.send((message, len)).map_err(|_| {
            self.buffered.fetch_sub(len, Ordering::SeqCst);
            TransferError::transport("websocket connection lost")
        })
    }

    async fn recv(&mut self) -> Result<Frame> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data)),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    return Ok(Frame::Close(reason));
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => {
                    return Ok(Frame::Close(None));
                }
                Some(Err(e)) => {
                    return Err(TransferError::transport(format!(
                        "websocket receive failed: {}",
                        e
                    )));
                }
            }
        }
    }

    async fn close(&mut self, reason: Option<String>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: reason
                .as_deref()
                .map(|r| truncate_reason(r).to_string())
                .unwrap_or_default()
                .into(),
        };
        let _ = tx.send((Message::Close(Some(frame)), 0));
        drop(tx);

        // Wait for queued frames and the close frame to hit the socket
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }
}
