//! WebSocket upload endpoint
//!
//! Each upgraded connection runs one receiving session.

mod channel;
mod handler;
mod state;

pub use channel::WsChannel;
pub use handler::handle_socket;
pub use state::UploadState;

use axum::{
    extract::{ConnectInfo, State, WebSocketUpgrade},
    response::Response,
};
use std::{net::SocketAddr, sync::Arc};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<UploadState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let client_ip = addr.ip().to_string();

    ws.on_upgrade(move |socket| handle_socket(socket, state, client_ip))
}
