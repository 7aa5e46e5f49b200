//! Provides the builder for the daemon.

use crate::courier_error::{CourierError, CourierResult};
use crate::default_functions::{default_error_handler, default_not_found_handler};
use crate::dispatcher::Dispatcher;
use crate::functional_traits::HttpMiddleware;
use crate::http;
use crate::http_bridge::DispatcherBridge;
use crate::rpc::RpcEndpoint;
use crate::courier_server::Server;
use crate::service::SubscriptionRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Handler for errors escaping the middleware chain.
pub type ErrorHandler = fn(&mut http::RequestContext, CourierError) -> CourierResult<http::Response>;

/// Fallback handler when no middleware answered a plain HTTP request.
pub type NotFoundHandler = fn(&mut http::RequestContext) -> CourierResult<http::Response>;

/// Accumulates the daemon configuration and the dispatcher's route table,
/// then builds an immutable [Server].
pub struct ServerBuilder {
  dispatcher: Dispatcher,
  middlewares: Vec<Box<dyn HttpMiddleware>>,
  http_dispatch: bool,
  error_handler: ErrorHandler,
  not_found_handler: NotFoundHandler,
  max_head_buffer_size: usize,
  max_body_size: u64,
  connection_timeout: Option<Duration>,
  read_timeout: Option<Duration>,
  keep_alive_timeout: Option<Duration>,
  write_timeout: Option<Duration>,
}

impl Default for ServerBuilder {
  fn default() -> Self {
    Self {
      dispatcher: Dispatcher::new(),
      middlewares: Vec::new(),
      http_dispatch: true,
      error_handler: default_error_handler,
      not_found_handler: default_not_found_handler,
      max_head_buffer_size: 8192,
      max_body_size: 0x40_00_00,
      connection_timeout: None,
      read_timeout: None,
      keep_alive_timeout: None,
      write_timeout: None,
    }
  }
}

impl ServerBuilder {
  /// Build a [Server] using a closure or fn which receives the builder.
  pub fn builder<T: FnOnce(ServerBuilder) -> CourierResult<ServerBuilder>>(
    closure: T,
  ) -> CourierResult<Server> {
    closure(ServerBuilder::default()).map(|builder| builder.build())
  }

  /// Build an `Arc<Server>` using a closure or fn which receives the builder.
  pub fn builder_arc<T: FnOnce(ServerBuilder) -> CourierResult<ServerBuilder>>(
    closure: T,
  ) -> CourierResult<Arc<Server>> {
    closure(ServerBuilder::default()).map(|builder| builder.build_arc())
  }

  /// Configures the route table. The closure receives the dispatcher and can
  /// be applied several times.
  pub fn dispatcher<T: FnOnce(&mut Dispatcher) -> CourierResult<()>>(
    mut self,
    closure: T,
  ) -> CourierResult<Self> {
    closure(&mut self.dispatcher)?;
    Ok(self)
  }

  /// Appends a middleware to the plain-HTTP chain. The dispatcher bridge, if
  /// enabled, always runs first; middlewares added here see what it passed on.
  pub fn with_middleware(mut self, middleware: impl HttpMiddleware + 'static) -> Self {
    self.middlewares.push(Box::new(middleware));
    self
  }

  /// Controls whether dispatcher routes are reachable over plain HTTP.
  /// Enabled by default.
  pub fn with_http_dispatch(mut self, enabled: bool) -> Self {
    self.http_dispatch = enabled;
    self
  }

  /// Sets the error handler for the HTTP chain.
  pub fn with_error_handler(mut self, handler: ErrorHandler) -> CourierResult<Self> {
    self.error_handler = handler;
    Ok(self)
  }

  /// Sets the not found handler for the HTTP chain.
  pub fn with_not_found_handler(mut self, handler: NotFoundHandler) -> CourierResult<Self> {
    self.not_found_handler = handler;
    Ok(self)
  }

  /// Sets the maximum size of a request head line. Default 8192.
  pub fn with_max_head_buffer_size(mut self, size: usize) -> CourierResult<Self> {
    self.max_head_buffer_size = size;
    Ok(self)
  }

  /// Sets the maximum accepted request body size in bytes. Default 4 MiB.
  pub fn with_max_body_size(mut self, size: u64) -> CourierResult<Self> {
    self.max_body_size = size;
    Ok(self)
  }

  /// Sets the connection timeout, the amount of time the daemon waits for the
  /// first byte of a connection. Falls back to the read timeout.
  pub fn with_connection_timeout(mut self, timeout: Option<Duration>) -> CourierResult<Self> {
    self.connection_timeout = timeout;
    Ok(self)
  }

  /// Sets the read timeout. Default is None, an infinite timeout.
  pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> CourierResult<Self> {
    self.read_timeout = timeout;
    Ok(self)
  }

  /// Sets the keep alive timeout. None makes the read timeout apply, a zero
  /// duration disables keep-alive entirely.
  pub fn with_keep_alive_timeout(mut self, timeout: Option<Duration>) -> CourierResult<Self> {
    self.keep_alive_timeout = timeout;
    Ok(self)
  }

  /// Sets the write timeout. Default is None, an infinite timeout.
  pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> CourierResult<Self> {
    self.write_timeout = timeout;
    Ok(self)
  }

  /// Helper fn to make builder code look a bit cleaner.
  pub fn ok(self) -> CourierResult<Self> {
    Ok(self)
  }

  /// This method creates the [Server] from the builder.
  pub fn build(self) -> Server {
    let dispatcher = Arc::new(self.dispatcher);
    let subscriptions = Arc::new(SubscriptionRegistry::new());

    let mut middlewares: Vec<Box<dyn HttpMiddleware>> = Vec::new();
    if self.http_dispatch {
      middlewares.push(Box::new(DispatcherBridge::new(Arc::clone(&dispatcher))));
    }
    middlewares.extend(self.middlewares);

    Server::new(
      RpcEndpoint::new(dispatcher, subscriptions),
      middlewares,
      self.error_handler,
      self.not_found_handler,
      self.max_head_buffer_size,
      self.max_body_size,
      self.connection_timeout,
      self.read_timeout,
      self.keep_alive_timeout,
      self.write_timeout,
    )
  }

  /// This method is equivalent to calling `Arc::new(builder.build())`.
  pub fn build_arc(self) -> Arc<Server> {
    Arc::new(self.build())
  }
}
