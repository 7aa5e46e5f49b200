//! Defines traits for endpoint, service and middleware functions.

use crate::context::Context;
use crate::courier_error::CourierResult;
use crate::dispatcher::Next;
use crate::http;
use crate::service::Subscription;
use std::fmt::{Debug, Formatter};
use std::thread;
use std::thread::JoinHandle;

/// Represents an opaque join handle
pub struct ThreadAdapterJoinHandle(Box<dyn FnOnce() -> thread::Result<()> + Send>);

impl ThreadAdapterJoinHandle {
  /// Constructor
  pub fn new(inner: Box<dyn FnOnce() -> thread::Result<()> + Send>) -> Self {
    ThreadAdapterJoinHandle(inner)
  }

  /// Calls the join fn
  pub fn join(self) -> thread::Result<()> {
    self.0()
  }
}

impl Debug for ThreadAdapterJoinHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str("ThreadAdapterJoinHandle")
  }
}

impl Default for ThreadAdapterJoinHandle {
  fn default() -> Self {
    Self(Box::new(|| Ok(())))
  }
}

/// Trait that represents a user implemented opaque thread starting/pooling mechanism.
pub trait ThreadAdapter: Send + Sync + Debug {
  /// Executes the given task immediately in a thread, like "thread::spawn".
  fn spawn(&self, task: Box<dyn FnOnce() + Send>) -> CourierResult<ThreadAdapterJoinHandle>;
}

#[derive(Debug)]
pub(crate) struct DefaultThreadAdapter;
impl ThreadAdapter for DefaultThreadAdapter {
  fn spawn(&self, task: Box<dyn FnOnce() + Send>) -> CourierResult<ThreadAdapterJoinHandle> {
    let hdl: JoinHandle<()> = thread::Builder::new().spawn(task)?;
    Ok(ThreadAdapterJoinHandle::new(Box::new(move || hdl.join())))
  }
}

/// A route handler in the dispatcher's table. It receives the request context
/// and a one-shot continuation to the rest of the chain.
///
/// ## Example
/// ```
/// use courier::{Context, CourierResult, Next};
///
/// fn status(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
///   ctx.send(serde_json::json!({ "ok": true }));
///   Ok(())
/// }
/// ```
pub trait Endpoint: Send + Sync {
  /// Serve one dispatch. Writing to `ctx.response()` and returning Ok is the
  /// normal way to answer; calling `next.run(ctx)` defers to the next route.
  fn handle(&self, ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()>;
}

trait IntoEndpointResult {
  fn into(self) -> CourierResult<()>;
}

impl IntoEndpointResult for CourierResult<()> {
  fn into(self) -> CourierResult<()> {
    self
  }
}

impl IntoEndpointResult for () {
  fn into(self) -> CourierResult<()> {
    Ok(())
  }
}

impl<F, R> Endpoint for F
where
  R: IntoEndpointResult,
  F: Fn(&mut Context, &mut Next<'_>) -> R + Send + Sync,
{
  fn handle(&self, ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()> {
    self(ctx, next).into()
  }
}

/// A handler that expresses the three lifecycle operations of a long-lived
/// endpoint through one registration. The dispatcher demultiplexes on the
/// request kind: `call` goes to [Service::on_call], `subscribe` opens an event
/// stream and `unsubscribe` closes it again.
pub trait Service: Send + Sync {
  /// One-shot request, the default operation.
  fn on_call(&self, ctx: &mut Context) -> CourierResult<()>;

  /// A new subscriber. The acknowledgment message has already been written
  /// when this runs, so anything published here arrives after it. Keep a
  /// clone of `subscription` around to publish later.
  fn on_subscribe(&self, subscription: &Subscription, ctx: &Context) -> CourierResult<()> {
    let _ = (subscription, ctx);
    Ok(())
  }

  /// The subscription ended, by explicit unsubscribe or by disconnect.
  /// Invoked exactly once per subscription.
  fn on_unsubscribe(&self, subscription: &Subscription) {
    let _ = subscription;
  }
}

impl<S: Service + ?Sized> Service for std::sync::Arc<S> {
  fn on_call(&self, ctx: &mut Context) -> CourierResult<()> {
    S::on_call(self, ctx)
  }

  fn on_subscribe(&self, subscription: &Subscription, ctx: &Context) -> CourierResult<()> {
    S::on_subscribe(self, subscription, ctx)
  }

  fn on_unsubscribe(&self, subscription: &Subscription) {
    S::on_unsubscribe(self, subscription)
  }
}

trait IntoMiddlewareResult {
  fn into(self) -> CourierResult<Option<http::Response>>;
}

impl IntoMiddlewareResult for CourierResult<Option<http::Response>> {
  fn into(self) -> CourierResult<Option<http::Response>> {
    self
  }
}

impl IntoMiddlewareResult for Option<http::Response> {
  fn into(self) -> CourierResult<Option<http::Response>> {
    Ok(self)
  }
}

/// One element of the server's HTTP middleware chain.
/// Ok(Some) -> request answered.
/// Ok(None) -> not handled, the next middleware gets it.
/// Err -> the error handler runs.
pub trait HttpMiddleware: Send + Sync {
  /// Handle or decline one plain HTTP request.
  fn handle(&self, request: &mut http::RequestContext) -> CourierResult<Option<http::Response>>;
}

impl<F, R> HttpMiddleware for F
where
  R: IntoMiddlewareResult,
  F: Fn(&mut http::RequestContext) -> R + Send + Sync,
{
  fn handle(&self, request: &mut http::RequestContext) -> CourierResult<Option<http::Response>> {
    self(request).into()
  }
}
