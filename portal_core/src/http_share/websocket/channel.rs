//! [`Channel`] over an accepted axum WebSocket

use crate::error::{Result, TransferError};
use crate::transfer::channel::truncate_reason;
use crate::transfer::{Channel, Frame};
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};

pub struct WsChannel {
    socket: WebSocket,
    closed: bool,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

impl Channel for WsChannel {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.closed {
            return Err(TransferError::transport("websocket is closed"));
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close(reason) => {
                self.close(reason).await;
                return Ok(());
            }
        };
        self.socket
            .send(message)
            .await
            .map_err(|e| TransferError::transport(format!("websocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Result<Frame> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text.to_string())),
                Some(Ok(Message::Binary(data))) => return Ok(Frame::Binary(data)),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty());
                    return Ok(Frame::Close(reason));
                }
                // axum answers pings itself
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => {
                    return Err(TransferError::transport(format!(
                        "websocket receive failed: {}",
                        e
                    )));
                }
                None => return Ok(Frame::Close(None)),
            }
        }
    }

    async fn close(&mut self, reason: Option<String>) {
        if self.closed {
            return;
        }
        self.closed = true;
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: reason
                .as_deref()
                .map(|r| truncate_reason(r).to_string())
                .unwrap_or_default()
                .into(),
        };
        if let Err(e) = self.socket.send(Message::Close(Some(frame))).await {
            tracing::debug!("close frame not delivered: {}", e);
        }
    }
}
