//! The framed message shapes of the RPC protocol and their two encodings.
//!
//! Text WebSocket frames carry JSON, binary frames carry MessagePack. A reply
//! always uses the encoding of the request it answers.

use crate::context::RequestKind;
use crate::courier_error::{CourierResult, RpcError};
use crate::websocket::message::WebsocketMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The protocol version this daemon accepts.
pub const PROTOCOL_VERSION: &str = "1.0";

fn default_data() -> Value {
  Value::Object(Map::new())
}

/// One client request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
  /// Declared protocol version, must be "1.0".
  pub version: String,
  /// Opaque client chosen correlation token, echoed on every reply.
  pub id: String,
  /// The virtual path to dispatch.
  pub path: String,
  /// Request payload, defaults to an empty object.
  #[serde(default = "default_data")]
  pub data: Value,
  /// What to do with the path, defaults to `call`.
  #[serde(default, rename = "type")]
  pub kind: RequestKind,
}

impl RpcRequest {
  /// Constructor for the common case.
  pub fn new(id: impl ToString, path: impl ToString, data: Value, kind: RequestKind) -> Self {
    RpcRequest {
      version: PROTOCOL_VERSION.to_string(),
      id: id.to_string(),
      path: path.to_string(),
      data,
      kind,
    }
  }

  /// Checks the frame is something the dispatcher can work with. Transports
  /// drop invalid frames without a reply, the reason only goes to the log.
  pub fn validate(&self) -> Result<(), String> {
    if self.version != PROTOCOL_VERSION {
      return Err(format!("unsupported protocol version {:?}", self.version));
    }
    if self.id.is_empty() {
      return Err("request id is empty".to_string());
    }
    if !self.path.starts_with('/') {
      return Err(format!("request path {:?} is not absolute", self.path));
    }
    Ok(())
  }
}

/// One server response frame. `status` is present on the direct answer to a
/// request; streamed subscription events that follow carry only id and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
  /// Correlation token of the request this answers.
  pub id: String,
  /// HTTP-style status of the request, omitted on stream events.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<u16>,
  /// Symbolic error code, only present on error frames.
  #[serde(default, rename = "statusCode", skip_serializing_if = "Option::is_none")]
  pub status_code: Option<String>,
  /// The message body.
  pub message: Value,
}

impl RpcResponse {
  /// The direct answer to a request.
  pub fn result(id: impl ToString, status: u16, message: Value) -> Self {
    RpcResponse { id: id.to_string(), status: Some(status), status_code: None, message }
  }

  /// A streamed subscription event.
  pub fn event(id: impl ToString, message: Value) -> Self {
    RpcResponse { id: id.to_string(), status: None, status_code: None, message }
  }

  /// A serialized taxonomy error.
  pub fn error(id: impl ToString, error: &RpcError) -> Self {
    RpcResponse {
      id: id.to_string(),
      status: Some(error.status()),
      status_code: Some(error.code().to_string()),
      message: Value::String(error.message().to_string()),
    }
  }
}

/// The two wire encodings, selected per frame by the frame type the client
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
  /// Text frames.
  Json,
  /// Binary frames.
  MsgPack,
}

impl WireFormat {
  /// Decodes a request frame body.
  pub fn decode_request(&self, bytes: &[u8]) -> CourierResult<RpcRequest> {
    match self {
      WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
      WireFormat::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
    }
  }

  /// Decodes a response frame body. The server never does this, clients and
  /// tests do.
  pub fn decode_response(&self, bytes: &[u8]) -> CourierResult<RpcResponse> {
    match self {
      WireFormat::Json => Ok(serde_json::from_slice(bytes)?),
      WireFormat::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
    }
  }

  /// Encodes a response into the matching WebSocket frame type. MessagePack
  /// uses named field encoding so bodies survive the JSON round trip.
  pub fn encode_response(&self, response: &RpcResponse) -> CourierResult<WebsocketMessage> {
    match self {
      WireFormat::Json => Ok(WebsocketMessage::Text(serde_json::to_string(response)?)),
      WireFormat::MsgPack => Ok(WebsocketMessage::Binary(rmp_serde::to_vec_named(response)?)),
    }
  }

  /// Encodes a request. Client-side helper, used by the tests.
  pub fn encode_request(&self, request: &RpcRequest) -> CourierResult<WebsocketMessage> {
    match self {
      WireFormat::Json => Ok(WebsocketMessage::Text(serde_json::to_string(request)?)),
      WireFormat::MsgPack => Ok(WebsocketMessage::Binary(rmp_serde::to_vec_named(request)?)),
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use serde_json::json;

  #[test]
  fn request_defaults() {
    let request: RpcRequest =
      serde_json::from_str(r#"{"version":"1.0","id":"a","path":"/status"}"#).unwrap();
    assert_eq!(request.kind, RequestKind::Call);
    assert_eq!(request.data, json!({}));
    assert!(request.validate().is_ok());
  }

  #[test]
  fn request_validation() {
    let mut request = RpcRequest::new("a", "/x", json!({}), RequestKind::Call);
    request.version = "2.0".to_string();
    assert!(request.validate().is_err());

    let request = RpcRequest::new("", "/x", json!({}), RequestKind::Call);
    assert!(request.validate().is_err());

    let request = RpcRequest::new("a", "x", json!({}), RequestKind::Call);
    assert!(request.validate().is_err());
  }

  #[test]
  fn event_frames_omit_status() {
    let event = RpcResponse::event("e", json!({"t": 1}));
    assert_eq!(serde_json::to_string(&event).unwrap(), r#"{"id":"e","message":{"t":1}}"#);
  }

  #[test]
  fn error_frames_carry_the_symbolic_code() {
    let error = RpcResponse::error("d", &RpcError::not_found());
    let text = serde_json::to_string(&error).unwrap();
    assert_eq!(text, r#"{"id":"d","status":404,"statusCode":"NOT_FOUND","message":"Not Found"}"#);
  }

  #[test]
  fn bodies_survive_both_encodings() {
    let body = json!({
      "bool": true,
      "int": 42,
      "float": 1.5,
      "string": "text",
      "array": [1, "two", null],
      "object": { "nested": {} },
      "null": null
    });
    let response = RpcResponse::result("r", 200, body);

    for format in [WireFormat::Json, WireFormat::MsgPack] {
      let encoded = match format.encode_response(&response).unwrap() {
        WebsocketMessage::Text(text) => text.into_bytes(),
        WebsocketMessage::Binary(bytes) => bytes,
        other => panic!("unexpected frame {other:?}"),
      };
      let decoded = format.decode_response(encoded.as_slice()).unwrap();
      assert_eq!(decoded, response);
    }
  }

  #[test]
  fn subscribe_kind_round_trips_through_msgpack() {
    let request = RpcRequest::new("e", "/clock", json!({}), RequestKind::Subscribe);
    let encoded = rmp_serde::to_vec_named(&request).unwrap();
    let decoded: RpcRequest = rmp_serde::from_slice(encoded.as_slice()).unwrap();
    assert_eq!(decoded.kind, RequestKind::Subscribe);
    assert_eq!(decoded.path, "/clock");
  }
}
