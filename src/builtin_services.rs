//! Ready-made services a daemon can mount.

use crate::context::Context;
use crate::courier_error::CourierResult;
use crate::functional_traits::Service;
use crate::service::Subscription;
use serde_json::{json, Value};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::SeqCst;
use std::time::Instant;

/// Daemon self-introspection: uptime, pid, how many status requests were
/// served and how many subscriptions are live. Register it wherever it should
/// be reachable:
///
/// ```
/// use courier::{Dispatcher, StatusService};
///
/// let mut dispatcher = Dispatcher::new();
/// dispatcher.service("/daemon/status", StatusService::new()).unwrap();
/// ```
#[derive(Debug)]
pub struct StatusService {
  started: Instant,
  served: AtomicU64,
}

impl Default for StatusService {
  fn default() -> Self {
    StatusService { started: Instant::now(), served: AtomicU64::new(0) }
  }
}

impl StatusService {
  /// Constructor.
  pub fn new() -> Self {
    StatusService::default()
  }

  fn snapshot(&self, live_subscriptions: usize) -> Value {
    json!({
      "pid": std::process::id(),
      "uptime": self.started.elapsed().as_secs_f64(),
      "served": self.served.load(SeqCst),
      "subscriptions": live_subscriptions,
    })
  }
}

impl Service for StatusService {
  fn on_call(&self, ctx: &mut Context) -> CourierResult<()> {
    self.served.fetch_add(1, SeqCst);
    let live = ctx.client().map(|c| c.subscriptions().active_count()).unwrap_or(0);
    ctx.send(self.snapshot(live));
    Ok(())
  }

  fn on_subscribe(&self, subscription: &Subscription, ctx: &Context) -> CourierResult<()> {
    self.served.fetch_add(1, SeqCst);
    let live = ctx.client().map(|c| c.subscriptions().active_count()).unwrap_or(0);
    subscription.publish(self.snapshot(live));
    Ok(())
  }
}
