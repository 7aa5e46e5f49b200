//! Subscription bookkeeping and the service lifecycle glue.

use crate::context::{Context, RequestKind, ResponseMessage, ResponseSink};
use crate::courier_error::{CourierResult, RpcError};
use crate::functional_traits::Service;
use crate::path_pattern::PathPattern;
use crate::util::unwrap_poison;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A path-plus-service pair, the registration shape used by plugins that hand
/// their endpoints to a host dispatcher.
pub struct ServiceDescriptor<S: Service> {
  /// Where to register.
  pub path: PathPattern,
  /// What to register.
  pub service: S,
}

impl<S: Service> ServiceDescriptor<S> {
  /// Constructor.
  pub fn new(path: impl Into<PathPattern>, service: S) -> Self {
    ServiceDescriptor { path: path.into(), service }
  }

  pub(crate) fn into_parts(self) -> (PathPattern, S) {
    (self.path, self.service)
  }
}

/// Identifies the client connection a dispatch arrived on and carries the
/// daemon's subscription registry. Stamped onto the [Context] by the
/// WebSocket transport; absent for HTTP and direct calls.
#[derive(Clone)]
pub struct ClientHandle {
  conn_id: u128,
  registry: Arc<SubscriptionRegistry>,
}

impl Debug for ClientHandle {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("ClientHandle({})", self.conn_id))
  }
}

impl ClientHandle {
  /// Constructor.
  pub fn new(conn_id: u128, registry: Arc<SubscriptionRegistry>) -> Self {
    ClientHandle { conn_id, registry }
  }

  /// The connection id.
  pub fn connection_id(&self) -> u128 {
    self.conn_id
  }

  /// The registry tracking this connection's subscriptions.
  pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
    &self.registry
  }
}

/// A live event stream of one `(service, client)` pair. Clones share the
/// stream; services keep one to publish from background threads.
#[derive(Clone)]
pub struct Subscription {
  sid: String,
  conn_id: u128,
  route: String,
  sink: ResponseSink,
}

impl Debug for Subscription {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("Subscription(sid={}, route={})", self.sid, self.route))
  }
}

impl Subscription {
  /// The server generated subscription id.
  pub fn sid(&self) -> &str {
    self.sid.as_str()
  }

  /// The route pattern the subscription was made against.
  pub fn route(&self) -> &str {
    self.route.as_str()
  }

  /// The owning connection.
  pub fn connection_id(&self) -> u128 {
    self.conn_id
  }

  /// Publishes one event to the subscriber. Returns false once the stream is
  /// gone; publishers must not assume delivery.
  pub fn publish(&self, event: Value) -> bool {
    self.sink.push(ResponseMessage { status: 200, body: event })
  }

  /// True once the stream was closed by unsubscribe or disconnect.
  pub fn is_closed(&self) -> bool {
    self.sink.is_closed()
  }
}

struct SubscriptionEntry {
  subscription: Subscription,
  service: Arc<dyn Service>,
}

/// All live subscriptions of the daemon, keyed by connection and sid.
///
/// Teardown discipline: an entry is always removed from the map before its
/// unsubscribe hook runs, so explicit unsubscribe and disconnect can race
/// without ever firing the hook twice.
#[derive(Default)]
pub struct SubscriptionRegistry {
  connections: Mutex<HashMap<u128, HashMap<String, SubscriptionEntry>>>,
}

impl Debug for SubscriptionRegistry {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("SubscriptionRegistry({} live)", self.active_count()))
  }
}

impl SubscriptionRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    SubscriptionRegistry::default()
  }

  fn insert(&self, entry: SubscriptionEntry) {
    if let Ok(mut connections) = unwrap_poison(self.connections.lock()) {
      connections
        .entry(entry.subscription.conn_id)
        .or_default()
        .insert(entry.subscription.sid.clone(), entry);
    }
  }

  fn remove(&self, conn_id: u128, sid: &str) -> Option<SubscriptionEntry> {
    let mut connections = unwrap_poison(self.connections.lock()).ok()?;
    let subs = connections.get_mut(&conn_id)?;
    let entry = subs.remove(sid);
    if subs.is_empty() {
      connections.remove(&conn_id);
    }
    entry
  }

  fn remove_route(&self, conn_id: u128, route: &str) -> Vec<SubscriptionEntry> {
    let Ok(mut connections) = unwrap_poison(self.connections.lock()) else {
      return Vec::new();
    };

    let Some(subs) = connections.get_mut(&conn_id) else {
      return Vec::new();
    };

    let sids: Vec<String> =
      subs.iter().filter(|(_, e)| e.subscription.route == route).map(|(sid, _)| sid.clone()).collect();

    let removed = sids.iter().filter_map(|sid| subs.remove(sid)).collect();
    if subs.is_empty() {
      connections.remove(&conn_id);
    }
    removed
  }

  /// Tears down every subscription of a closed connection. Each unsubscribe
  /// hook fires exactly once, the streams are closed without a farewell
  /// message since nobody is listening anymore.
  pub fn drop_connection(&self, conn_id: u128) {
    let entries = match unwrap_poison(self.connections.lock()) {
      Ok(mut connections) => connections.remove(&conn_id),
      Err(_) => None,
    };

    let Some(entries) = entries else {
      return;
    };

    log::debug!("connection {conn_id} disconnected with {} live subscriptions", entries.len());
    for (_, entry) in entries {
      entry.subscription.sink.close();
      entry.service.on_unsubscribe(&entry.subscription);
    }
  }

  /// Number of live subscriptions across all connections.
  pub fn active_count(&self) -> usize {
    unwrap_poison(self.connections.lock())
      .map(|connections| connections.values().map(|subs| subs.len()).sum())
      .unwrap_or(0)
  }
}

/// Demultiplexes a dispatch onto the service lifecycle.
pub(crate) fn serve(
  service: &Arc<dyn Service>,
  route: &str,
  ctx: &mut Context,
) -> CourierResult<()> {
  match ctx.kind() {
    RequestKind::Call => service.on_call(ctx),
    RequestKind::Subscribe => subscribe(service, route, ctx),
    RequestKind::Unsubscribe => unsubscribe(route, ctx),
  }
}

fn subscribe(service: &Arc<dyn Service>, route: &str, ctx: &mut Context) -> CourierResult<()> {
  let Some(client) = ctx.client().cloned() else {
    return Err(RpcError::bad_request("subscriptions require a persistent connection").into());
  };

  let subscription = Subscription {
    sid: Uuid::new_v4().to_string(),
    conn_id: client.connection_id(),
    route: route.to_string(),
    sink: ctx.response().clone(),
  };

  log::debug!("subscribe {} sid={}", route, subscription.sid);

  // The acknowledgment goes out before the service runs, so no publish can
  // overtake it.
  ctx.send(json!({ "type": "subscribe", "sid": subscription.sid, "path": ctx.path() }));

  client.subscriptions().insert(SubscriptionEntry {
    subscription: subscription.clone(),
    service: Arc::clone(service),
  });

  if let Err(err) = service.on_subscribe(&subscription, ctx) {
    // The stream never got going; take the entry back out without firing the
    // unsubscribe hook.
    client.subscriptions().remove(client.connection_id(), subscription.sid());
    subscription.sink.close();
    return Err(err);
  }

  Ok(())
}

fn unsubscribe(route: &str, ctx: &mut Context) -> CourierResult<()> {
  let Some(client) = ctx.client().cloned() else {
    return Err(RpcError::bad_request("subscriptions require a persistent connection").into());
  };

  let registry = client.subscriptions();
  let removed = match ctx.payload().get("sid").and_then(|v| v.as_str()) {
    Some(sid) => registry.remove(client.connection_id(), sid).into_iter().collect::<Vec<_>>(),
    None => registry.remove_route(client.connection_id(), route),
  };

  if removed.is_empty() {
    return Err(RpcError::new(404, "NOT_FOUND", "no active subscription").into());
  }

  for entry in removed {
    let subscription = &entry.subscription;
    log::debug!("unsubscribe {} sid={}", route, subscription.sid);
    subscription.sink.push(ResponseMessage {
      status: 200,
      body: json!({ "type": "unsubscribe", "sid": subscription.sid }),
    });
    subscription.sink.close();
    entry.service.on_unsubscribe(subscription);
  }

  ctx.send(json!({ "type": "unsubscribe" }));
  Ok(())
}
