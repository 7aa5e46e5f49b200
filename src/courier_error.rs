//! The crate wide error type and the RPC error taxonomy.
#![allow(missing_docs)]

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;
use std::io::ErrorKind;

pub type CourierResult<T> = Result<T, CourierError>;

/// An error that crosses the RPC boundary. Every instance carries an HTTP-style
/// numeric status, a stable symbolic code and a human readable message.
///
/// Handlers may construct their own instances with any status they like, those
/// travel to the client unchanged. Everything that is not an [RpcError] is
/// coerced to `SERVER_ERROR` before it leaves the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
  status: u16,
  code: String,
  message: String,
}

impl RpcError {
  /// An error with a caller chosen status, symbolic code and message.
  pub fn new(status: u16, code: impl ToString, message: impl ToString) -> Self {
    RpcError { status, code: code.to_string(), message: message.to_string() }
  }

  /// 404, no route matched the request path.
  pub fn not_found() -> Self {
    Self::new(404, "NOT_FOUND", "Not Found")
  }

  /// 400, the payload was malformed. Reserved for handler use.
  pub fn bad_request(message: impl ToString) -> Self {
    Self::new(400, "BAD_REQUEST", message)
  }

  /// 500, catch-all for unclassified handler failure.
  pub fn server_error(message: impl ToString) -> Self {
    Self::new(500, "SERVER_ERROR", message)
  }

  /// The numeric status.
  pub fn status(&self) -> u16 {
    self.status
  }

  /// The symbolic code, for example `NOT_FOUND`.
  pub fn code(&self) -> &str {
    self.code.as_str()
  }

  /// The message intended for the client.
  pub fn message(&self) -> &str {
    self.message.as_str()
  }

  /// True if this is the routing miss error.
  pub fn is_not_found(&self) -> bool {
    self.status == 404 && self.code == "NOT_FOUND"
  }
}

impl Display for RpcError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("{} {}: {}", self.status, self.code, self.message))
  }
}
impl Error for RpcError {}

/// Registration-time errors. These are reported to the caller of `route`/`mount`
/// and never surface at dispatch time.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
  EmptyParameterName(String),
  InvalidParameterName(String, String),
  RegexSyntaxError(String, String),
  MountPrefixNotLiteral(String),
  MountPrefixNotAbsolute(String),
  PathNotAbsolute(String),
}

impl Display for RouteError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      RouteError::EmptyParameterName(pat) => {
        f.write_fmt(format_args!("pattern {pat} contains a parameter without a name"))
      }
      RouteError::InvalidParameterName(pat, name) => {
        f.write_fmt(format_args!("pattern {pat} parameter name {name} is not an identifier"))
      }
      RouteError::RegexSyntaxError(pat, err) => {
        f.write_fmt(format_args!("pattern {pat} does not compile: {err}"))
      }
      RouteError::MountPrefixNotLiteral(pat) => {
        f.write_fmt(format_args!("mount prefix {pat} must not contain parameters or wildcards"))
      }
      RouteError::MountPrefixNotAbsolute(pat) => {
        f.write_fmt(format_args!("mount prefix {pat} must start with /"))
      }
      RouteError::PathNotAbsolute(pat) => {
        f.write_fmt(format_args!("pattern {pat} must start with /"))
      }
    }
  }
}
impl Error for RouteError {}

/// Errors produced while parsing the HTTP head or WebSocket frames of a connection.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
  StatusLineNoCRLF,
  StatusLineMalformed(String),
  InvalidPath(String),
  InvalidPathUrlEncoding(String),
  HeaderLineIsNotUsAscii,
  HeaderNameEmpty,
  HeaderValueMissing,
  HeaderLineTooLong(usize),
  HttpVersionNotSupported(String),
  TransferEncodingNotSupported(String),
  InvalidContentLength(String),
  RequestBodyTooLarge(u64),
  MissingSecWebSocketKeyHeader,
  UpgradeRequiresHttp11,
  InvalidWebSocketOpcode(u8),
  UnexpectedWebSocketOpcode,
  WebSocketClosedDuringPendingMessage,
  WebSocketTextMessageIsNotUtf8,
}

impl Display for ProtocolError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Debug::fmt(self, f)
  }
}
impl Error for ProtocolError {}

#[derive(Debug)]
#[non_exhaustive]
pub enum CourierError {
  Rpc(RpcError),
  Route(RouteError),
  Protocol(ProtocolError),
  IO(io::Error),
  Other(Box<dyn Error + Send + Sync>),
}

impl CourierError {
  pub fn new_io<E: Into<Box<dyn Error + Send + Sync>>>(kind: ErrorKind, message: E) -> CourierError {
    io::Error::new(kind, message).into()
  }

  pub fn from_io_kind(kind: ErrorKind) -> CourierError {
    io::Error::from(kind).into()
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      CourierError::IO(io) => io.kind(),
      CourierError::Protocol(_) => ErrorKind::InvalidData,
      _ => ErrorKind::Other,
    }
  }

  /// The status-bearing view of this error as it is serialized to a client.
  /// Taxonomy errors keep their status, everything else becomes `SERVER_ERROR`.
  pub fn to_rpc_error(&self) -> RpcError {
    match self {
      CourierError::Rpc(rpc) => rpc.clone(),
      other => RpcError::server_error(other),
    }
  }

  pub fn downcast_ref<T: Error + Send + 'static>(&self) -> Option<&T> {
    match self {
      CourierError::Rpc(err) => (err as &dyn Error).downcast_ref::<T>(),
      CourierError::Route(err) => (err as &dyn Error).downcast_ref::<T>(),
      CourierError::Protocol(err) => (err as &dyn Error).downcast_ref::<T>(),
      CourierError::IO(err) => (err as &dyn Error).downcast_ref::<T>(),
      CourierError::Other(other) => other.downcast_ref::<T>(),
    }
  }

  pub fn into_inner(self) -> Box<dyn Error + Send + Sync + 'static> {
    match self {
      CourierError::Rpc(err) => Box::new(err) as Box<dyn Error + Send + Sync>,
      CourierError::Route(err) => Box::new(err) as Box<dyn Error + Send + Sync>,
      CourierError::Protocol(err) => Box::new(err) as Box<dyn Error + Send + Sync>,
      CourierError::IO(err) => Box::new(err) as Box<dyn Error + Send + Sync>,
      CourierError::Other(other) => other,
    }
  }
}

impl Display for CourierError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      CourierError::Rpc(err) => Display::fmt(err, f),
      CourierError::Route(err) => Display::fmt(err, f),
      CourierError::Protocol(err) => Display::fmt(err, f),
      CourierError::IO(err) => Display::fmt(err, f),
      CourierError::Other(err) => Display::fmt(err, f),
    }
  }
}

impl<T> From<T> for CourierError
where
  T: Error + Send + Sync + 'static,
{
  fn from(value: T) -> Self {
    let mut dyn_box = Box::new(value) as Box<dyn Error + Send + Sync>;
    dyn_box = match dyn_box.downcast::<io::Error>() {
      Ok(err) => return CourierError::IO(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<RpcError>() {
      Ok(err) => return CourierError::Rpc(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<RouteError>() {
      Ok(err) => return CourierError::Route(*err),
      Err(err) => err,
    };
    dyn_box = match dyn_box.downcast::<ProtocolError>() {
      Ok(err) => return CourierError::Protocol(*err),
      Err(err) => err,
    };

    CourierError::Other(dyn_box)
  }
}

impl From<CourierError> for io::Error {
  fn from(value: CourierError) -> Self {
    match value {
      CourierError::IO(io) => io,
      err => io::Error::new(err.kind(), err.into_inner()),
    }
  }
}
