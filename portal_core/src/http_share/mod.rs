//! HTTP upload endpoint
//!
//! Serves the WebSocket upload protocol to browsers and the CLI client.

pub mod server;
pub mod websocket;

pub use server::{create_router, lan_ip, serve, start_server};
pub use websocket::{UploadState, WsChannel};
