//! The HTTP middleware adapter of the dispatcher.
//!
//! Plain HTTP clients can invoke any `call` route of the daemon without
//! holding a WebSocket. Subscriptions need a persistent connection and are
//! not reachable this way.

use crate::context::Context;
use crate::courier_error::{CourierError, CourierResult, RpcError};
use crate::dispatcher::Dispatcher;
use crate::functional_traits::HttpMiddleware;
use crate::http;
use crate::http::Method;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Adapts the dispatcher into the server's middleware chain.
pub struct DispatcherBridge {
  dispatcher: Arc<Dispatcher>,
}

impl DispatcherBridge {
  /// Constructor.
  pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
    DispatcherBridge { dispatcher }
  }
}

impl HttpMiddleware for DispatcherBridge {
  fn handle(&self, request: &mut http::RequestContext) -> CourierResult<Option<http::Response>> {
    // HEAD goes straight to whatever middleware comes after us.
    if request.head().method() == &Method::Head {
      log::trace!("request {} is HEAD, not dispatching", request.id());
      return Ok(None);
    }

    let payload = match request.head().method() {
      Method::Put | Method::Post => match request.body() {
        Some(body) => match serde_json::from_slice::<Value>(body) {
          Ok(value) => value,
          Err(err) => {
            log::debug!("request {} body is not JSON: {err}", request.id());
            return Ok(Some(http::Response::text(
              http::StatusCode::BadRequest,
              "request body is not valid JSON",
            )));
          }
        },
        None => Value::Object(Map::new()),
      },
      _ => Value::Object(Map::new()),
    };

    let mut ctx = Context::new(payload);
    match self.dispatcher.call(request.head().path(), &mut ctx) {
      Ok(()) => {
        let body =
          ctx.response().drain().into_iter().next().map(|m| m.body).unwrap_or(Value::Null);
        Ok(Some(http::Response::json(ctx.status(), &body)?))
      }
      Err(CourierError::Rpc(rpc)) if rpc.is_not_found() => {
        log::trace!("request {} has no route, passing on", request.id());
        Ok(None)
      }
      Err(err) => {
        log::error!("request {} failed: {err}", request.id());
        let rpc: RpcError = err.to_rpc_error();
        Ok(Some(http::Response::text(rpc.status(), rpc.message())))
      }
    }
  }
}
