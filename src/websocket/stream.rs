//! The message level view of an upgraded connection.

use crate::courier_error::{CourierResult, ProtocolError};
use crate::stream::ConnectionStream;
use crate::websocket::frame::{Frame, Opcode};
use crate::websocket::message::WebsocketMessage;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;

/// Sending side of a web socket. Safe to share across threads; writes are
/// serialized by the underlying connection.
///
/// `peer_closed` is shared with the receiver and records that the client
/// started the closing handshake; `sent_close` only guards our own Close
/// frame. Keeping them apart is what lets the sender still answer a
/// peer-initiated close with the responding Close frame, exactly once.
pub struct WebsocketSender {
  peer_closed: Arc<AtomicBool>,
  sent_close: AtomicBool,
  stream: Box<dyn ConnectionStream>,
}

/// Receiving side of a web socket.
pub struct WebsocketReceiver {
  peer_closed: Arc<AtomicBool>,
  pending: Vec<Frame>,
  stream: Box<dyn ConnectionStream>,
}

/// Creates a WebSocket sender/receiver pair over an upgraded connection.
pub fn new_websocket_stream(
  connection: &dyn ConnectionStream,
) -> (WebsocketSender, WebsocketReceiver) {
  let peer_closed = Arc::new(AtomicBool::new(false));
  let sender = WebsocketSender {
    peer_closed: Arc::clone(&peer_closed),
    sent_close: AtomicBool::new(false),
    stream: connection.new_ref(),
  };
  let receiver =
    WebsocketReceiver { peer_closed, pending: Vec::new(), stream: connection.new_ref() };
  (sender, receiver)
}

impl WebsocketSender {
  /// Sends a message to the client.
  pub fn send(&self, message: WebsocketMessage) -> CourierResult<()> {
    match message {
      WebsocketMessage::Text(txt) => self.text(txt),
      WebsocketMessage::Binary(bin) => self.binary(bin),
      WebsocketMessage::Ping => self.ping(),
      WebsocketMessage::Pong => self.pong(),
    }
  }

  /// Sends a binary message to the client.
  pub fn binary(&self, message: impl Into<Vec<u8>>) -> CourierResult<()> {
    Frame::new(Opcode::Binary, message.into()).write_to(self.stream.as_ref())
  }

  /// Sends a text message to the client.
  pub fn text(&self, message: impl ToString) -> CourierResult<()> {
    Frame::new(Opcode::Text, message.to_string().into_bytes()).write_to(self.stream.as_ref())
  }

  /// Sends a ping to the client.
  pub fn ping(&self) -> CourierResult<()> {
    Frame::new(Opcode::Ping, Vec::new()).write_to(self.stream.as_ref())
  }

  /// Sends a pong to the client.
  pub fn pong(&self) -> CourierResult<()> {
    Frame::new(Opcode::Pong, Vec::new()).write_to(self.stream.as_ref())
  }

  /// Sends our Close frame, completing the closing handshake when the client
  /// started it. Idempotent.
  pub fn close(&self) -> CourierResult<()> {
    if !self.sent_close.swap(true, SeqCst) {
      Frame::new(Opcode::Close, Vec::new()).write_to(self.stream.as_ref())?;
    }
    Ok(())
  }

  /// True once either side closed the socket.
  pub fn is_closed(&self) -> bool {
    self.peer_closed.load(SeqCst) || self.sent_close.load(SeqCst)
  }
}

impl Drop for WebsocketSender {
  fn drop(&mut self) {
    self.close().ok();
  }
}

impl WebsocketReceiver {
  /// Receives the next complete message. Fragmented messages are assembled,
  /// control frames are surfaced to the caller as they arrive. None means the
  /// client closed the socket.
  pub fn recv(&mut self) -> CourierResult<Option<WebsocketMessage>> {
    if self.peer_closed.load(SeqCst) {
      return Ok(None);
    }

    while self.pending.last().map(|f| !f.fin).unwrap_or(true) {
      let frame = Frame::from_stream(self.stream.as_ref())?;

      match frame.opcode {
        Opcode::Ping => return Ok(Some(WebsocketMessage::Ping)),
        Opcode::Pong => return Ok(Some(WebsocketMessage::Pong)),
        Opcode::Close => {
          self.peer_closed.store(true, SeqCst);
          if self.pending.is_empty() {
            return Ok(None);
          }
          return Err(ProtocolError::WebSocketClosedDuringPendingMessage.into());
        }
        _ => self.pending.push(frame),
      }
    }

    let frames = mem::take(&mut self.pending);
    let Some(first) = frames.first() else {
      return Err(ProtocolError::UnexpectedWebSocketOpcode.into());
    };
    let frame_type = first.opcode;

    let size = frames.iter().map(|f| f.payload.len()).sum();
    let mut payload = Vec::with_capacity(size);
    for (idx, frame) in frames.into_iter().enumerate() {
      if idx != 0 && frame.opcode != Opcode::Continuation {
        return Err(ProtocolError::UnexpectedWebSocketOpcode.into());
      }
      payload.extend_from_slice(frame.payload.as_slice());
    }

    match frame_type {
      Opcode::Text => {
        let payload = String::from_utf8(payload).map_err(|_| {
          self.peer_closed.store(true, SeqCst);
          ProtocolError::WebSocketTextMessageIsNotUtf8
        })?;
        Ok(Some(WebsocketMessage::Text(payload)))
      }
      Opcode::Binary => Ok(Some(WebsocketMessage::Binary(payload))),
      _ => {
        self.peer_closed.store(true, SeqCst);
        Err(ProtocolError::UnexpectedWebSocketOpcode.into())
      }
    }
  }
}
