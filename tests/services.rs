use courier::{
  ClientHandle, Context, CourierError, CourierResult, Dispatcher, RequestKind, Service,
  ServiceDescriptor, Subscription, SubscriptionRegistry,
};
use serde_json::{json, Value};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct ClockService {
  subscribes: AtomicU64,
  unsubscribes: AtomicU64,
  live: Mutex<Vec<Subscription>>,
}

impl Service for ClockService {
  fn on_call(&self, ctx: &mut Context) -> CourierResult<()> {
    ctx.send(json!({ "now": 0 }));
    Ok(())
  }

  fn on_subscribe(&self, subscription: &Subscription, _ctx: &Context) -> CourierResult<()> {
    self.subscribes.fetch_add(1, SeqCst);
    subscription.publish(json!({ "t": 1 }));
    subscription.publish(json!({ "t": 2 }));
    self.live.lock().unwrap().push(subscription.clone());
    Ok(())
  }

  fn on_unsubscribe(&self, _subscription: &Subscription) {
    self.unsubscribes.fetch_add(1, SeqCst);
  }
}

struct Fixture {
  dispatcher: Dispatcher,
  clock: Arc<ClockService>,
  registry: Arc<SubscriptionRegistry>,
}

fn fixture() -> Fixture {
  let clock = Arc::new(ClockService::default());
  let registry = Arc::new(SubscriptionRegistry::new());

  let mut dispatcher = Dispatcher::new();
  dispatcher.register(ServiceDescriptor::new("/clock", Arc::clone(&clock))).unwrap();

  Fixture { dispatcher, clock, registry }
}

fn client(fixture: &Fixture, conn_id: u128) -> ClientHandle {
  ClientHandle::new(conn_id, Arc::clone(&fixture.registry))
}

fn subscribe(fixture: &Fixture, conn_id: u128) -> Context {
  let mut ctx = Context::new(json!({}))
    .with_kind(RequestKind::Subscribe)
    .with_client(client(fixture, conn_id));
  fixture.dispatcher.call("/clock", &mut ctx).unwrap();
  ctx
}

#[test]
fn a_call_is_served_by_on_call() {
  let fixture = fixture();
  let mut ctx = Context::new(json!({})).with_client(client(&fixture, 1));
  fixture.dispatcher.call("/clock", &mut ctx).unwrap();

  let messages = ctx.response().drain();
  assert_eq!(messages.len(), 1);
  assert_eq!(messages[0].body, json!({ "now": 0 }));
  assert_eq!(fixture.clock.subscribes.load(SeqCst), 0);
}

#[test]
fn the_ack_always_precedes_the_first_publish() {
  let fixture = fixture();
  let ctx = subscribe(&fixture, 1);

  let messages = ctx.response().drain();
  assert_eq!(messages.len(), 3);

  let ack = &messages[0].body;
  assert_eq!(ack.get("type"), Some(&json!("subscribe")));
  let sid = ack.get("sid").and_then(Value::as_str).expect("ack carries a sid");
  assert!(!sid.is_empty());
  assert_eq!(messages[0].status, 200);

  assert_eq!(messages[1].body, json!({ "t": 1 }));
  assert_eq!(messages[2].body, json!({ "t": 2 }));

  assert_eq!(fixture.clock.subscribes.load(SeqCst), 1);
  assert_eq!(fixture.registry.active_count(), 1);
}

#[test]
fn every_subscription_gets_its_own_sid() {
  let fixture = fixture();
  let first = subscribe(&fixture, 1);
  let second = subscribe(&fixture, 1);

  let sid_of = |ctx: &Context| {
    ctx.response().drain()[0].body.get("sid").and_then(Value::as_str).unwrap().to_string()
  };

  assert_ne!(sid_of(&first), sid_of(&second));
  assert_eq!(fixture.registry.active_count(), 2);
}

#[test]
fn unsubscribe_tears_down_exactly_once() {
  let fixture = fixture();
  let sub_ctx = subscribe(&fixture, 1);
  sub_ctx.response().drain();

  let mut unsub_ctx = Context::new(json!({}))
    .with_kind(RequestKind::Unsubscribe)
    .with_client(client(&fixture, 1));
  fixture.dispatcher.call("/clock", &mut unsub_ctx).unwrap();

  assert_eq!(fixture.clock.unsubscribes.load(SeqCst), 1);
  assert_eq!(fixture.registry.active_count(), 0);

  // The event stream received its farewell and was closed.
  let closing = sub_ctx.response().drain();
  assert_eq!(closing.len(), 1);
  assert_eq!(closing[0].body.get("type"), Some(&json!("unsubscribe")));
  assert!(sub_ctx.response().is_closed());

  // The unsubscribe request itself got a confirmation.
  let confirmation = unsub_ctx.response().drain();
  assert_eq!(confirmation.len(), 1);
  assert_eq!(confirmation[0].body, json!({ "type": "unsubscribe" }));

  // A second unsubscribe has nothing left to remove.
  let mut again = Context::new(json!({}))
    .with_kind(RequestKind::Unsubscribe)
    .with_client(client(&fixture, 1));
  let err = fixture.dispatcher.call("/clock", &mut again).unwrap_err();
  assert!(matches!(err, CourierError::Rpc(rpc) if rpc.status() == 404));
  assert_eq!(fixture.clock.unsubscribes.load(SeqCst), 1);
}

#[test]
fn unsubscribe_by_sid_only_removes_that_stream() {
  let fixture = fixture();
  let first = subscribe(&fixture, 1);
  let _second = subscribe(&fixture, 1);

  let sid = first.response().drain()[0].body.get("sid").and_then(Value::as_str).unwrap().to_string();

  let mut unsub_ctx = Context::new(json!({ "sid": sid }))
    .with_kind(RequestKind::Unsubscribe)
    .with_client(client(&fixture, 1));
  fixture.dispatcher.call("/clock", &mut unsub_ctx).unwrap();

  assert_eq!(fixture.clock.unsubscribes.load(SeqCst), 1);
  assert_eq!(fixture.registry.active_count(), 1);
}

#[test]
fn disconnect_tears_down_every_subscription_of_the_connection() {
  let fixture = fixture();
  let _one = subscribe(&fixture, 7);
  let _two = subscribe(&fixture, 7);
  let _other = subscribe(&fixture, 8);

  fixture.registry.drop_connection(7);

  assert_eq!(fixture.clock.unsubscribes.load(SeqCst), 2);
  assert_eq!(fixture.registry.active_count(), 1);

  // The survivor belongs to the other connection and can still publish.
  let survivors = fixture.clock.live.lock().unwrap();
  let alive: Vec<_> = survivors.iter().filter(|s| !s.is_closed()).collect();
  assert_eq!(alive.len(), 1);
  assert_eq!(alive[0].connection_id(), 8);
  assert!(alive[0].publish(json!({ "t": 3 })));
}

#[test]
fn disconnect_after_unsubscribe_does_not_fire_the_hook_again() {
  let fixture = fixture();
  let _sub = subscribe(&fixture, 1);

  let mut unsub_ctx = Context::new(json!({}))
    .with_kind(RequestKind::Unsubscribe)
    .with_client(client(&fixture, 1));
  fixture.dispatcher.call("/clock", &mut unsub_ctx).unwrap();
  fixture.registry.drop_connection(1);

  assert_eq!(fixture.clock.unsubscribes.load(SeqCst), 1);
}

#[test]
fn publishing_into_a_closed_stream_is_a_noop() {
  let fixture = fixture();
  let _sub = subscribe(&fixture, 1);
  fixture.registry.drop_connection(1);

  let survivors = fixture.clock.live.lock().unwrap();
  assert!(!survivors[0].publish(json!({ "t": 99 })));
}

#[test]
fn subscribing_without_a_connection_is_a_bad_request() {
  let fixture = fixture();
  let mut ctx = Context::new(json!({})).with_kind(RequestKind::Subscribe);
  let err = fixture.dispatcher.call("/clock", &mut ctx).unwrap_err();
  assert!(matches!(err, CourierError::Rpc(rpc) if rpc.status() == 400));
}
