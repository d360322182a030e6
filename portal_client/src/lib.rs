pub mod connector;
pub mod sender;

pub use connector::WsClientChannel;
pub use sender::{enumerate, upload};
