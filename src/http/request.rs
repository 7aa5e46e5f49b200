//! Request head parsing and the per-request state handed to middlewares.

use crate::courier_error::{CourierResult, ProtocolError};
use crate::http::headers::Headers;
use crate::http::method::Method;
use crate::stream::ConnectionStream;
use crate::util;
use std::fmt::{Display, Formatter};

/// The HTTP versions the daemon accepts.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum HttpVersion {
  /// Plain requests only, one connection per request.
  Http10,
  /// Keep-alive and upgrades.
  Http11,
}

impl HttpVersion {
  /// The network bytes on the status line.
  pub fn as_net_str(&self) -> &'static str {
    match self {
      HttpVersion::Http10 => "HTTP/1.0",
      HttpVersion::Http11 => "HTTP/1.1",
    }
  }

  /// Parses the version token of a status line.
  pub fn try_from_net_str<T: AsRef<str>>(value: T) -> Result<Self, T> {
    match value.as_ref() {
      "HTTP/1.0" => Ok(HttpVersion::Http10),
      "HTTP/1.1" => Ok(HttpVersion::Http11),
      _ => Err(value),
    }
  }
}

impl Display for HttpVersion {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_net_str())
  }
}

/// The parsed head of a request.
#[derive(Clone, Debug)]
pub struct RequestHead {
  method: Method,
  version: HttpVersion,
  path: String,
  query: String,
  headers: Headers,
}

fn read_line(stream: &dyn ConnectionStream, limit: usize) -> CourierResult<String> {
  let mut buffer = Vec::new();
  stream.read_until(b'\n', limit, &mut buffer)?;

  if buffer.last() != Some(&b'\n') {
    if buffer.is_empty() {
      return Err(crate::courier_error::CourierError::from_io_kind(
        std::io::ErrorKind::UnexpectedEof,
      ));
    }
    return Err(ProtocolError::HeaderLineTooLong(buffer.len()).into());
  }

  buffer.pop();
  if buffer.last() == Some(&b'\r') {
    buffer.pop();
  }

  if !buffer.is_ascii() {
    return Err(ProtocolError::HeaderLineIsNotUsAscii.into());
  }

  String::from_utf8(buffer).map_err(|_| ProtocolError::HeaderLineIsNotUsAscii.into())
}

impl RequestHead {
  /// Reads and parses one request head off the stream.
  pub fn read(stream: &dyn ConnectionStream, max_head: usize) -> CourierResult<RequestHead> {
    let status_line = read_line(stream, max_head)?;

    let mut tokens = status_line.split(' ').filter(|t| !t.is_empty());
    let (Some(method), Some(target), Some(version), None) =
      (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
      return Err(ProtocolError::StatusLineMalformed(status_line.clone()).into());
    };

    let version = HttpVersion::try_from_net_str(version)
      .map_err(|v| ProtocolError::HttpVersionNotSupported(v.to_string()))?;

    let (raw_path, query) = match target.split_once('?') {
      Some((path, query)) => (path, query.to_string()),
      None => (target, String::new()),
    };

    let path = urlencoding::decode(raw_path)
      .map_err(|_| ProtocolError::InvalidPathUrlEncoding(raw_path.to_string()))?
      .to_string();

    if !path.starts_with('/') {
      return Err(ProtocolError::InvalidPath(path).into());
    }

    let mut headers = Headers::new();
    loop {
      let line = read_line(stream, max_head)?;
      if line.is_empty() {
        break;
      }

      let Some((name, value)) = line.split_once(':') else {
        return Err(ProtocolError::HeaderValueMissing.into());
      };

      if name.trim().is_empty() {
        return Err(ProtocolError::HeaderNameEmpty.into());
      }

      headers.push(name.trim(), value.trim());
    }

    Ok(RequestHead { method: Method::from_token(method), version, path, query, headers })
  }

  /// The request method.
  pub fn method(&self) -> &Method {
    &self.method
  }

  /// The negotiated HTTP version.
  pub fn version(&self) -> HttpVersion {
    self.version
  }

  /// The percent-decoded path, without the query string.
  pub fn path(&self) -> &str {
    self.path.as_str()
  }

  /// The raw query string, empty when there was none.
  pub fn query(&self) -> &str {
    self.query.as_str()
  }

  /// The first value of the named header.
  pub fn get_header(&self, name: impl AsRef<str>) -> Option<&str> {
    self.headers.get(name)
  }

  /// All headers.
  pub fn headers(&self) -> &Headers {
    &self.headers
  }

  /// True if this request asks for a WebSocket protocol switch.
  pub fn is_websocket_upgrade(&self) -> bool {
    self
      .get_header("Upgrade")
      .map(|v| v.eq_ignore_ascii_case("websocket"))
      .unwrap_or(false)
  }
}

/// All state of one plain HTTP request as seen by the middleware chain.
#[derive(Debug)]
pub struct RequestContext {
  id: u128,
  peer: String,
  head: RequestHead,
  body: Option<Vec<u8>>,
  force_close: bool,
}

impl RequestContext {
  /// Reads the head and, if the request declares one, the body off the stream.
  /// Chunked transfer encoding is out of protocol scope and rejected.
  pub fn read(
    stream: &dyn ConnectionStream,
    max_head: usize,
    max_body: u64,
  ) -> CourierResult<RequestContext> {
    let id = util::next_id();
    let peer = stream.peer_addr().unwrap_or_default();
    let head = RequestHead::read(stream, max_head)?;

    if let Some(encoding) = head.get_header("Transfer-Encoding") {
      return Err(ProtocolError::TransferEncodingNotSupported(encoding.to_string()).into());
    }

    let body = match head.get_header("Content-Length") {
      None => None,
      Some(raw) => {
        let length: u64 = raw
          .parse()
          .map_err(|_| ProtocolError::InvalidContentLength(raw.to_string()))?;

        if length > max_body {
          return Err(ProtocolError::RequestBodyTooLarge(length).into());
        }

        if length == 0 {
          None
        } else {
          // Bodies are read eagerly even for methods that do not use them,
          // otherwise keep-alive framing would desynchronize.
          let mut body = vec![0u8; length as usize];
          stream.read_exact(body.as_mut_slice())?;
          Some(body)
        }
      }
    };

    Ok(RequestContext { id, peer, head, body, force_close: false })
  }

  /// Unique id of this request, used in logs.
  pub fn id(&self) -> u128 {
    self.id
  }

  /// The peer address.
  pub fn peer_addr(&self) -> &str {
    self.peer.as_str()
  }

  /// The parsed head.
  pub fn head(&self) -> &RequestHead {
    &self.head
  }

  /// The request body, if one was sent.
  pub fn body(&self) -> Option<&[u8]> {
    self.body.as_deref()
  }

  /// Forces the connection to close after this request is answered.
  pub fn force_connection_close(&mut self) {
    self.force_close = true;
  }

  /// True if the connection must close after this request.
  pub fn is_connection_close_forced(&self) -> bool {
    self.force_close
  }
}
