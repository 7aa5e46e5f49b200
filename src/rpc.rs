//! The WebSocket RPC transport.
//!
//! One [RpcEndpoint] serves every upgraded connection of the daemon. Inbound
//! frames are decoded to [RpcRequest]s, dispatched, and everything the
//! dispatch writes to its response sink is forwarded to the wire as it
//! happens, so subscription acks and events leave in the order they were
//! produced.

use crate::context::{Context, RequestKind, ResponseMessage, ResponseSink, SinkWriter};
use crate::courier_error::CourierResult;
use crate::dispatcher::Dispatcher;
use crate::service::{ClientHandle, SubscriptionRegistry};
use crate::util;
use crate::websocket::message::WebsocketMessage;
use crate::websocket::stream::{WebsocketReceiver, WebsocketSender};
use crate::wire::{RpcResponse, WireFormat};
use serde_json::Value;
use std::io;
use std::sync::Arc;

/// What the daemon knows about a connected client, collected from the upgrade
/// request headers.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
  /// The peer address.
  pub peer: String,
  /// The client's User-Agent header, verbatim.
  pub user_agent: Option<String>,
  /// The negotiated locale from Accept-Language, if the client sent one.
  pub locale: Option<String>,
}

/// Forwards response messages of one request as frames carrying that request's
/// id. The first message is the direct answer and carries the status,
/// everything after is a stream event.
struct WireWriter {
  sender: Arc<WebsocketSender>,
  format: WireFormat,
  id: String,
  first: bool,
}

impl SinkWriter for WireWriter {
  fn write(&mut self, message: &ResponseMessage) -> io::Result<()> {
    let response = if self.first {
      RpcResponse::result(self.id.as_str(), message.status, message.body.clone())
    } else {
      RpcResponse::event(self.id.as_str(), message.body.clone())
    };
    self.first = false;

    let frame = self.format.encode_response(&response).map_err(io::Error::from)?;
    self.sender.send(frame).map_err(io::Error::from)
  }
}

/// The RPC surface served to every WebSocket connection.
pub struct RpcEndpoint {
  dispatcher: Arc<Dispatcher>,
  subscriptions: Arc<SubscriptionRegistry>,
}

impl RpcEndpoint {
  /// Constructor.
  pub fn new(dispatcher: Arc<Dispatcher>, subscriptions: Arc<SubscriptionRegistry>) -> Self {
    RpcEndpoint { dispatcher, subscriptions }
  }

  /// The dispatcher behind this endpoint.
  pub fn dispatcher(&self) -> &Arc<Dispatcher> {
    &self.dispatcher
  }

  /// The subscription registry shared with the dispatcher's services.
  pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
    &self.subscriptions
  }

  /// Drives one upgraded connection until the client goes away. Always tears
  /// down the connection's subscriptions on the way out, whether the close
  /// was orderly or not.
  pub fn serve(
    &self,
    info: ClientInfo,
    sender: WebsocketSender,
    mut receiver: WebsocketReceiver,
  ) -> CourierResult<()> {
    let conn_id = util::next_id();
    let sender = Arc::new(sender);

    log::info!(
      "connection {} from {} user-agent={:?} locale={:?}",
      conn_id,
      info.peer,
      info.user_agent,
      info.locale
    );

    let result = self.connection_loop(conn_id, &sender, &mut receiver);

    self.subscriptions.drop_connection(conn_id);
    log::info!("connection {conn_id} closed");
    result
  }

  fn connection_loop(
    &self,
    conn_id: u128,
    sender: &Arc<WebsocketSender>,
    receiver: &mut WebsocketReceiver,
  ) -> CourierResult<()> {
    loop {
      let message = match receiver.recv()? {
        Some(message) => message,
        None => return Ok(()),
      };

      let (format, bytes) = match &message {
        WebsocketMessage::Text(text) => (WireFormat::Json, text.as_bytes()),
        WebsocketMessage::Binary(bytes) => (WireFormat::MsgPack, bytes.as_slice()),
        WebsocketMessage::Ping => {
          sender.pong()?;
          continue;
        }
        WebsocketMessage::Pong => continue,
      };

      let request = match format.decode_request(bytes) {
        Ok(request) => request,
        Err(err) => {
          log::warn!("connection {conn_id}: dropping undecodable frame: {err}");
          continue;
        }
      };

      if let Err(reason) = request.validate() {
        log::warn!("connection {conn_id}: dropping invalid request: {reason}");
        continue;
      }

      log::debug!(
        "connection {} request {} {:?} {}",
        conn_id,
        request.id,
        request.kind,
        request.path
      );

      let sink = ResponseSink::new();
      sink
        .attach_writer(Box::new(WireWriter {
          sender: Arc::clone(sender),
          format,
          id: request.id.clone(),
          first: true,
        }))
        .ok();

      let mut ctx = Context::new(request.data)
        .with_kind(request.kind)
        .with_sink(sink.clone())
        .with_client(ClientHandle::new(conn_id, Arc::clone(&self.subscriptions)));

      match self.dispatcher.call(request.path.as_str(), &mut ctx) {
        Ok(()) => match request.kind {
          RequestKind::Subscribe => {
            // The sink stays open, it is the event stream now.
          }
          _ => {
            if sink.write_count() == 0 {
              ctx.send(Value::Null);
            }
            sink.close();
          }
        },
        Err(err) => {
          let rpc = err.to_rpc_error();
          log::error!("connection {} request {} failed: {}", conn_id, request.id, err);
          sink.close();

          let frame = RpcResponse::error(request.id.as_str(), &rpc);
          match format.encode_response(&frame) {
            Ok(encoded) => {
              if let Err(err) = sender.send(encoded) {
                log::debug!("connection {conn_id}: error frame not deliverable: {err}");
              }
            }
            Err(err) => log::error!("connection {conn_id}: error frame not encodable: {err}"),
          }
        }
      }
    }
  }
}
