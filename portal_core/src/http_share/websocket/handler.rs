//! WebSocket connection handler

use super::channel::WsChannel;
use super::state::UploadState;
use crate::transfer::FileReceiver;
use crate::transfer::constants::CLOSE_GRACE;
use axum::extract::ws::WebSocket;
use std::sync::Arc;

/// Run one receiving session on an upgraded connection
pub async fn handle_socket(socket: WebSocket, state: Arc<UploadState>, client_ip: String) {
    let _active = state.enter();
    tracing::info!(
        "WebSocket connection established from: {} ({} active)",
        client_ip,
        state.active_sessions()
    );

    let mut receiver = FileReceiver::new(
        WsChannel::new(socket),
        state.guard.clone(),
        state.config.clone(),
    );
    if let Some(tx) = &state.event_tx {
        receiver = receiver.with_events(tx.clone());
    }

    match receiver.run().await {
        Ok(summary) => {
            tracing::info!(
                "Session from {} finished: {} file(s), {} bytes ({:?})",
                client_ip,
                summary.files,
                summary.bytes_written,
                summary.end
            );
        }
        Err(e) => {
            tracing::error!("Session from {} failed: {}", client_ip, e);
            // Let the error text and close frame reach the peer before the
            // socket is dropped
            tokio::time::sleep(CLOSE_GRACE).await;
        }
    }
}
