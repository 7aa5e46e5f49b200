//! WebSocket framing for the RPC transport.

pub mod frame;
pub mod message;
pub mod stream;

pub use message::WebsocketMessage;
pub use stream::{new_websocket_stream, WebsocketReceiver, WebsocketSender};
