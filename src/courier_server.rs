//! The daemon front door: reads request heads off client connections, routes
//! WebSocket upgrades into the RPC endpoint and everything else through the
//! HTTP middleware chain. Also owns keep-alive and shutdown handling.

use crate::courier_error::{CourierError, CourierResult, ProtocolError};
use crate::courier_builder::{ErrorHandler, NotFoundHandler};
use crate::dispatcher::Dispatcher;
use crate::functional_traits::{DefaultThreadAdapter, HttpMiddleware, ThreadAdapter};
use crate::http;
use crate::http::HttpVersion;
use crate::rpc::{ClientInfo, RpcEndpoint};
use crate::service::SubscriptionRegistry;
use crate::stream::{ConnectionStream, IntoConnectionStream};
use crate::websocket::stream::new_websocket_stream;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Where the daemon listens unless told otherwise.
pub const DEFAULT_ADDR: &str = "127.0.0.1:1732";

struct Hooks(Mutex<Vec<Box<dyn FnMut() + Send + Sync>>>);

impl Debug for Hooks {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str("Hooks")
  }
}

impl Default for Hooks {
  fn default() -> Self {
    Self(Mutex::new(Vec::new()))
  }
}

/// A built daemon. It owns the dispatcher and the middleware chain but no OS
/// resources; connections are handed to it by [Server::listen] or directly
/// via [Server::handle_connection].
pub struct Server {
  shutdown: AtomicBool,
  rpc: RpcEndpoint,
  middlewares: Vec<Box<dyn HttpMiddleware>>,
  error_handler: ErrorHandler,
  not_found_handler: NotFoundHandler,
  max_head_buffer_size: usize,
  max_body_size: u64,
  connection_timeout: Option<Duration>,
  read_timeout: Option<Duration>,
  keep_alive_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
  shutdown_hooks: Hooks,
}

impl Debug for Server {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!(
      "Server(middlewares={}, shutdown={})",
      self.middlewares.len(),
      self.is_shutdown()
    ))
  }
}

impl Server {
  #[expect(clippy::too_many_arguments)] //Only called by the builder.
  pub(crate) fn new(
    rpc: RpcEndpoint,
    middlewares: Vec<Box<dyn HttpMiddleware>>,
    error_handler: ErrorHandler,
    not_found_handler: NotFoundHandler,
    max_head_buffer_size: usize,
    max_body_size: u64,
    connection_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    keep_alive_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
  ) -> Self {
    Server {
      shutdown: AtomicBool::new(false),
      rpc,
      middlewares,
      error_handler,
      not_found_handler,
      max_head_buffer_size,
      max_body_size,
      connection_timeout: connection_timeout.or(read_timeout),
      read_timeout,
      keep_alive_timeout: keep_alive_timeout.or(read_timeout),
      write_timeout,
      shutdown_hooks: Hooks::default(),
    }
  }

  /// The dispatcher all transports feed into.
  pub fn dispatcher(&self) -> &Arc<Dispatcher> {
    self.rpc.dispatcher()
  }

  /// The registry of live subscriptions.
  pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
    self.rpc.subscriptions()
  }

  /// Marks the server as shut down and runs the shutdown hooks. New
  /// connections are refused, keep-alive is disabled, in-flight requests
  /// finish.
  pub fn shutdown(&self) {
    self.shutdown.store(true, SeqCst);
    if let Ok(mut guard) = self.shutdown_hooks.0.lock() {
      while let Some(mut hook) = guard.pop() {
        hook()
      }
    }
  }

  /// True once [Server::shutdown] was called.
  pub fn is_shutdown(&self) -> bool {
    self.shutdown.load(SeqCst)
  }

  /// Adds a shutdown hook. Runs immediately if the server is already down.
  pub fn add_shutdown_hook<F: FnMut() + Sync + Send + 'static>(&self, mut hook: F) {
    let Ok(mut guard) = self.shutdown_hooks.0.lock() else {
      hook();
      return;
    };

    if self.is_shutdown() {
      drop(guard);
      hook();
      return;
    }

    guard.push(Box::new(hook));
  }

  /// Accepts connections on `addr` and serves each on its own thread until
  /// shutdown. Blocks the calling thread.
  pub fn listen(self: &Arc<Self>, addr: &str) -> CourierResult<()> {
    let listener = TcpListener::bind(addr)?;
    log::info!("listening on {addr}");

    let adapter = DefaultThreadAdapter;
    for stream in listener.incoming() {
      if self.is_shutdown() {
        break;
      }

      match stream {
        Ok(tcp) => {
          let server = Arc::clone(self);
          adapter.spawn(Box::new(move || {
            if let Err(err) = server.handle_connection(tcp) {
              log::debug!("connection ended: {err}");
            }
          }))?;
        }
        Err(err) => log::warn!("accept failed: {err}"),
      }
    }
    Ok(())
  }

  /// Serves one client connection to completion.
  pub fn handle_connection<S: IntoConnectionStream>(&self, stream: S) -> CourierResult<()> {
    if self.is_shutdown() {
      return Err(CourierError::from_io_kind(ErrorKind::ConnectionAborted));
    }

    log::trace!("new connection");
    let stream = stream.into_connection_stream();
    stream.set_read_timeout(self.connection_timeout)?;
    stream.set_write_timeout(self.write_timeout)?;
    if !stream.ensure_readable()? {
      return Err(CourierError::from_io_kind(ErrorKind::UnexpectedEof));
    }

    let mut count = 0u64;
    loop {
      if count > 0 && !self.handle_keep_alive(stream.as_ref())? {
        break;
      }

      stream.set_read_timeout(self.read_timeout)?;
      let mut request = http::RequestContext::read(
        stream.as_ref(),
        self.max_head_buffer_size,
        self.max_body_size,
      )?;
      count += 1;

      if request.head().is_websocket_upgrade() {
        return self.upgrade_websocket(stream.as_ref(), &request);
      }

      let mut keep_alive = !self.is_shutdown()
        && request.head().version() == HttpVersion::Http11
        && self.keep_alive_timeout.as_ref().map(|a| !a.is_zero()).unwrap_or(true)
        && request
          .head()
          .get_header("Connection")
          .map(|e| e.eq_ignore_ascii_case("keep-alive"))
          .unwrap_or_default();

      let response = self.serve_request(&mut request);

      keep_alive &= !request.is_connection_close_forced();
      self.write_response(stream.as_ref(), &request, keep_alive, response)?;

      if !keep_alive {
        break;
      }
      log::trace!("request {} keeps the connection alive", request.id());
    }

    log::trace!("connection closed");
    Ok(())
  }

  fn serve_request(&self, request: &mut http::RequestContext) -> http::Response {
    for middleware in self.middlewares.iter() {
      match middleware.handle(request) {
        Ok(Some(response)) => return response,
        Ok(None) => continue,
        Err(error) => {
          return (self.error_handler)(request, error)
            .unwrap_or_else(|e| self.fallback_error_handler(request, e))
        }
      }
    }

    (self.not_found_handler)(request)
      .unwrap_or_else(|e| self.fallback_error_handler(request, e))
  }

  fn fallback_error_handler(
    &self,
    request: &mut http::RequestContext,
    error: CourierError,
  ) -> http::Response {
    request.force_connection_close();
    log::error!(
      "request {} error handler failed, responding with bare 500: {:?}",
      request.id(),
      error
    );
    http::Response::new(http::StatusCode::InternalServerError)
  }

  fn write_response(
    &self,
    stream: &dyn ConnectionStream,
    request: &http::RequestContext,
    keep_alive: bool,
    mut response: http::Response,
  ) -> CourierResult<()> {
    if request.head().version() == HttpVersion::Http11 {
      response.headers.set("Connection", if keep_alive { "Keep-Alive" } else { "Close" });
    }

    log::info!(
      "request {} {} {} responded {}",
      request.id(),
      request.head().method(),
      request.head().path(),
      response.status.code()
    );
    response.write_to(request.head().version(), stream)
  }

  fn handle_keep_alive(&self, stream: &dyn ConnectionStream) -> CourierResult<bool> {
    if self.is_shutdown() {
      log::trace!("keep-alive: server shutting down");
      return Ok(false);
    }

    if stream.available() > 0 {
      return Ok(true);
    }

    stream.set_read_timeout(self.keep_alive_timeout)?;
    match stream.ensure_readable() {
      Ok(readable) => Ok(readable),
      Err(err) => match err.kind() {
        ErrorKind::UnexpectedEof
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => {
          log::trace!("keep-alive: client disconnected");
          Ok(false)
        }
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
          log::trace!("keep-alive: timed out");
          Ok(false)
        }
        _ => {
          log::error!("keep-alive: unexpected error waiting for data: {}", &err);
          Err(err.into())
        }
      },
    }
  }

  fn upgrade_websocket(
    &self,
    stream: &dyn ConnectionStream,
    request: &http::RequestContext,
  ) -> CourierResult<()> {
    let head = request.head();
    if head.version() != HttpVersion::Http11 {
      let response =
        http::Response::text(http::StatusCode::BadRequest, "WebSocket upgrades require HTTP/1.1");
      return response.write_to(head.version(), stream);
    }

    let response = match websocket_handshake(head) {
      Ok(response) => response,
      Err(err) => {
        log::warn!("request {} failed the WebSocket handshake: {err}", request.id());
        return http::Response::text(http::StatusCode::BadRequest, "bad WebSocket handshake")
          .write_to(HttpVersion::Http11, stream);
      }
    };

    response.write_to(HttpVersion::Http11, stream)?;

    let info = ClientInfo {
      peer: request.peer_addr().to_string(),
      user_agent: head.get_header("User-Agent").map(|v| v.to_string()),
      locale: head
        .get_header("Accept-Language")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string()),
    };

    let (sender, receiver) = new_websocket_stream(stream);
    self.rpc.serve(info, sender, receiver)
  }
}

impl Drop for Server {
  fn drop(&mut self) {
    self.shutdown();
    log::trace!("Server::drop");
  }
}

/// Performs the WebSocket handshake.
fn websocket_handshake(head: &http::RequestHead) -> CourierResult<http::Response> {
  const HANDSHAKE_KEY_CONSTANT: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

  let handshake_key =
    head.get_header("Sec-WebSocket-Key").ok_or(ProtocolError::MissingSecWebSocketKeyHeader)?;

  let sha1 =
    Sha1::new().chain_update(handshake_key).chain_update(HANDSHAKE_KEY_CONSTANT).finalize();
  let sec_websocket_accept = base64::prelude::BASE64_STANDARD.encode(sha1);

  Ok(
    http::Response::new(http::StatusCode::SwitchingProtocols)
      .with_header("Upgrade", "websocket")
      .with_header("Connection", "Upgrade")
      .with_header("Sec-WebSocket-Accept", sec_websocket_accept),
  )
}
