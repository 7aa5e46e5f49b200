//! The path-routed request engine.
//!
//! A [Dispatcher] is an ordered table of routes. Each route pairs a compiled
//! path pattern with a handler: a plain [Endpoint], a [Service] or another
//! Dispatcher mounted under a literal prefix. Dispatch walks the table in
//! registration order, the first route whose matcher accepts the path wins.

use crate::context::Context;
use crate::courier_error::{CourierResult, RouteError, RpcError};
use crate::functional_traits::{Endpoint, Service};
use crate::path_pattern::{PathMatcher, PathPattern};
use crate::service;
use crate::service::ServiceDescriptor;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

enum RouteHandler {
  Endpoint(Box<dyn Endpoint>),
  Service(Arc<dyn Service>),
  Nested(Arc<Dispatcher>),
}

/// A pattern-plus-handler entry in the dispatcher's table.
struct Route {
  pattern: String,
  matcher: PathMatcher,
  handler: RouteHandler,
}

impl Debug for Route {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let kind = match &self.handler {
      RouteHandler::Endpoint(_) => "endpoint",
      RouteHandler::Service(_) => "service",
      RouteHandler::Nested(_) => "dispatcher",
    };
    f.write_fmt(format_args!("Route({} -> {})", self.pattern, kind))
  }
}

/// The one-shot continuation handed to every endpoint. Running it resumes the
/// route walk directly after the current route; a second run is a no-op.
pub struct Next<'d> {
  dispatcher: &'d Dispatcher,
  index: usize,
  called: bool,
}

impl<'d> Next<'d> {
  fn new(dispatcher: &'d Dispatcher, index: usize) -> Self {
    Next { dispatcher, index, called: false }
  }

  /// Defers to the remaining route chain. The outcome is whatever the
  /// downstream routes produce, observable through the shared context.
  pub fn run(&mut self, ctx: &mut Context) -> CourierResult<()> {
    if self.called {
      log::debug!("next() invoked more than once for {}, ignoring", ctx.path());
      return Ok(());
    }

    self.called = true;
    self.dispatcher.call_from(ctx, self.index)
  }

  /// True once [Next::run] has been invoked.
  pub fn was_called(&self) -> bool {
    self.called
  }
}

// Lets one endpoint instance back multiple table entries.
struct SharedEndpoint(Arc<dyn Endpoint>);

impl Endpoint for SharedEndpoint {
  fn handle(&self, ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()> {
    self.0.handle(ctx, next)
  }
}

/// The route table. Registration happens at startup, dispatch afterwards is
/// lock-free shared reads.
#[derive(Default)]
pub struct Dispatcher {
  routes: Vec<Route>,
  prefix: Option<String>,
}

impl Debug for Dispatcher {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("Dispatcher(prefix={:?}, routes={:?})", self.prefix, self.routes))
  }
}

impl Dispatcher {
  /// An empty dispatcher.
  pub fn new() -> Self {
    Dispatcher::default()
  }

  /// The prefix this dispatcher is mounted under, if any.
  pub fn prefix(&self) -> Option<&str> {
    self.prefix.as_deref()
  }

  fn push_route(
    &mut self,
    pattern: PathPattern,
    handler: RouteHandler,
  ) -> CourierResult<()> {
    let terminal = !matches!(handler, RouteHandler::Nested(_));
    let matcher = PathMatcher::compile(&pattern, terminal)?;
    let pattern = pattern.to_string();

    // Every sub-dispatcher self-registers "/", no point tracing those.
    if !(pattern == "/" && self.prefix.is_some()) {
      log::trace!("registered route {pattern}");
    }

    self.routes.push(Route { pattern, matcher, handler });
    Ok(())
  }

  /// Registers an endpoint under one pattern.
  pub fn route<P, E>(&mut self, pattern: P, endpoint: E) -> CourierResult<&mut Self>
  where
    P: Into<PathPattern>,
    E: Endpoint + 'static,
  {
    self.push_route(pattern.into(), RouteHandler::Endpoint(Box::new(endpoint)))?;
    Ok(self)
  }

  /// Registers the same endpoint under several patterns at once.
  pub fn route_all<P, E>(&mut self, patterns: Vec<P>, endpoint: E) -> CourierResult<&mut Self>
  where
    P: Into<PathPattern>,
    E: Endpoint + 'static,
  {
    let shared = Arc::new(endpoint) as Arc<dyn Endpoint>;
    for pattern in patterns {
      self
        .push_route(pattern.into(), RouteHandler::Endpoint(Box::new(SharedEndpoint(Arc::clone(&shared)))))?;
    }
    Ok(self)
  }

  /// Registers a service under one pattern.
  pub fn service<P, S>(&mut self, pattern: P, service: S) -> CourierResult<&mut Self>
  where
    P: Into<PathPattern>,
    S: Service + 'static,
  {
    self.push_route(pattern.into(), RouteHandler::Service(Arc::new(service)))?;
    Ok(self)
  }

  /// Unwraps a path-plus-service descriptor and registers it.
  pub fn register<S: Service + 'static>(
    &mut self,
    descriptor: ServiceDescriptor<S>,
  ) -> CourierResult<&mut Self> {
    let (path, service) = descriptor.into_parts();
    self.service(path, service)
  }

  /// Mounts another dispatcher under a literal prefix. The prefix is stripped
  /// from the request path before the child sees it.
  pub fn mount<P: Into<PathPattern>>(
    &mut self,
    prefix: P,
    mut child: Dispatcher,
  ) -> CourierResult<&mut Self> {
    let pattern = prefix.into();
    if !pattern.is_literal() {
      return Err(RouteError::MountPrefixNotLiteral(pattern.to_string()).into());
    }

    let literal = pattern.to_string();
    if !literal.starts_with('/') {
      return Err(RouteError::MountPrefixNotAbsolute(literal).into());
    }

    child.prefix = Some(literal);
    self.push_route(pattern, RouteHandler::Nested(Arc::new(child)))?;
    Ok(self)
  }

  /// Dispatches a path against the table, threading the given context through
  /// the matching route chain. This is the single entry point used by the
  /// transports and by nested descent alike.
  pub fn call(&self, path: &str, ctx: &mut Context) -> CourierResult<()> {
    ctx.set_path(path);
    self.call_from(ctx, 0)
  }

  /// Convenience for in-process callers: builds a fresh [Context] carrying
  /// `payload`, dispatches, and hands the context back for inspection.
  pub fn dispatch(&self, path: &str, payload: Value) -> CourierResult<Context> {
    let mut ctx = Context::new(payload);
    self.call(path, &mut ctx)?;
    Ok(ctx)
  }

  fn call_from(&self, ctx: &mut Context, start: usize) -> CourierResult<()> {
    let mut index = start;

    while let Some(route) = self.routes.get(index) {
      let Some(hit) = route.matcher.matches(ctx.path()) else {
        log::trace!("route {} does not match {}", route.pattern, ctx.path());
        index += 1;
        continue;
      };

      log::trace!("route {} matches {}", route.pattern, ctx.path());
      ctx.replace_params(hit.params);

      match &route.handler {
        RouteHandler::Nested(child) => {
          let tail = match ctx.path().get(hit.end..) {
            None | Some("") => "/".to_string(),
            Some(tail) if tail.starts_with('/') => tail.to_string(),
            Some(tail) => format!("/{tail}"),
          };
          ctx.set_path(tail);
          return child.call_from(ctx, 0);
        }
        RouteHandler::Service(svc) => {
          return service::serve(svc, route.pattern.as_str(), ctx);
        }
        RouteHandler::Endpoint(endpoint) => {
          let mut next = Next::new(self, index + 1);
          return endpoint.handle(ctx, &mut next);
        }
      }
    }

    log::trace!("route table exhausted for {}", ctx.path());
    Err(RpcError::not_found().into())
  }
}
