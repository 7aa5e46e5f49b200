use courier::{Context, CourierError, CourierResult, Dispatcher, Next, ResponseMessage};
use serde_json::{json, Value};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::SeqCst;

fn write_ok(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  ctx.send(json!({ "ok": true }));
  Ok(())
}

fn echo_param(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  let value = ctx.param("v").unwrap_or_default().to_string();
  ctx.send(Value::String(value));
  Ok(())
}

fn bodies(ctx: &Context) -> Vec<Value> {
  ctx.response().drain().into_iter().map(|m| m.body).collect()
}

#[test]
fn literal_route_answers_the_call() {
  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/status", write_ok).unwrap();

  let ctx = dispatcher.dispatch("/status", json!({})).unwrap();
  assert_eq!(ctx.status(), 200);
  assert_eq!(
    ctx.response().drain(),
    vec![ResponseMessage { status: 200, body: json!({ "ok": true }) }]
  );
}

#[test]
fn parameterized_route_extracts_the_segment() {
  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/echo/:v", echo_param).unwrap();

  let ctx = dispatcher.dispatch("/echo/hello", json!({})).unwrap();
  assert_eq!(bodies(&ctx), vec![json!("hello")]);
}

#[test]
fn first_matching_route_wins_in_registration_order() {
  static FIRST: AtomicU64 = AtomicU64::new(0);
  static SECOND: AtomicU64 = AtomicU64::new(0);

  fn first(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    FIRST.fetch_add(1, SeqCst);
    ctx.send(json!("first"));
    Ok(())
  }

  fn second(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    SECOND.fetch_add(1, SeqCst);
    ctx.send(json!("second"));
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/:anything", first).unwrap();
  dispatcher.route("/a", second).unwrap();

  let ctx = dispatcher.dispatch("/a", json!({})).unwrap();
  assert_eq!(bodies(&ctx), vec![json!("first")]);
  assert_eq!(FIRST.load(SeqCst), 1);
  assert_eq!(SECOND.load(SeqCst), 0);
}

#[test]
fn duplicate_patterns_are_permitted_and_first_wins() {
  fn one(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    ctx.send(json!(1));
    Ok(())
  }
  fn two(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    ctx.send(json!(2));
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/dup", one).unwrap();
  dispatcher.route("/dup", two).unwrap();

  let ctx = dispatcher.dispatch("/dup", json!({})).unwrap();
  assert_eq!(bodies(&ctx), vec![json!(1)]);
}

#[test]
fn params_of_an_earlier_match_are_cleared_not_merged() {
  fn forward(ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()> {
    next.run(ctx)
  }

  fn capture(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    let params = ctx.params().cloned().unwrap_or_default();
    ctx.send(serde_json::to_value(params)?);
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/:q/:r", forward).unwrap();
  dispatcher.route("/:a/:b", capture).unwrap();

  let ctx = dispatcher.dispatch("/x/y", json!({})).unwrap();
  assert_eq!(bodies(&ctx), vec![json!({ "a": "x", "b": "y" })]);
}

#[test]
fn next_advances_to_the_following_route() {
  fn passes(ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()> {
    next.run(ctx)?;
    assert!(next.was_called());
    Ok(())
  }

  fn answers(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    ctx.send(json!("ok"));
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/a", passes).unwrap();
  dispatcher.route("/a", answers).unwrap();

  let ctx = dispatcher.dispatch("/a", json!({})).unwrap();
  assert_eq!(ctx.status(), 200);
  assert_eq!(bodies(&ctx), vec![json!("ok")]);
}

#[test]
fn second_next_invocation_is_a_noop() {
  static DOWNSTREAM: AtomicU64 = AtomicU64::new(0);

  fn eager(ctx: &mut Context, next: &mut Next<'_>) -> CourierResult<()> {
    next.run(ctx)?;
    next.run(ctx)?;
    Ok(())
  }

  fn counts(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    DOWNSTREAM.fetch_add(1, SeqCst);
    ctx.send(json!("counted"));
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/twice", eager).unwrap();
  dispatcher.route("/twice", counts).unwrap();

  let ctx = dispatcher.dispatch("/twice", json!({})).unwrap();
  assert_eq!(DOWNSTREAM.load(SeqCst), 1);
  assert_eq!(bodies(&ctx), vec![json!("counted")]);
}

#[test]
fn exhausted_table_rejects_with_not_found() {
  let dispatcher = Dispatcher::new();

  let mut ctx = Context::new(json!({}));
  let err = dispatcher.call("/nope", &mut ctx).unwrap_err();

  match err {
    CourierError::Rpc(rpc) => {
      assert_eq!(rpc.status(), 404);
      assert_eq!(rpc.code(), "NOT_FOUND");
      assert_eq!(rpc.message(), "Not Found");
    }
    other => panic!("unexpected error {other}"),
  }

  assert!(ctx.response().is_empty());
  assert_eq!(ctx.response().write_count(), 0);
}

#[test]
fn not_found_after_all_routes_were_tested() {
  static TESTED: AtomicU64 = AtomicU64::new(0);

  fn never(_ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    TESTED.fetch_add(1, SeqCst);
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/one", never).unwrap();
  dispatcher.route("/two", never).unwrap();

  let err = dispatcher.dispatch("/three", json!({})).unwrap_err();
  assert!(matches!(err, CourierError::Rpc(rpc) if rpc.is_not_found()));
  assert_eq!(TESTED.load(SeqCst), 0);
}

#[test]
fn handler_errors_reject_the_dispatch() {
  fn boom(_ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    Err(courier::RpcError::bad_request("bad payload").into())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/boom", boom).unwrap();

  let err = dispatcher.dispatch("/boom", json!({})).unwrap_err();
  match err {
    CourierError::Rpc(rpc) => {
      assert_eq!(rpc.status(), 400);
      assert_eq!(rpc.code(), "BAD_REQUEST");
    }
    other => panic!("unexpected error {other}"),
  }
}

#[test]
fn one_endpoint_may_back_several_patterns() {
  let mut dispatcher = Dispatcher::new();
  dispatcher.route_all(vec!["/first", "/second"], write_ok).unwrap();

  for path in ["/first", "/second"] {
    let ctx = dispatcher.dispatch(path, json!({})).unwrap();
    assert_eq!(bodies(&ctx), vec![json!({ "ok": true })]);
  }
}

#[test]
fn invalid_patterns_are_rejected_at_registration() {
  let mut dispatcher = Dispatcher::new();
  assert!(matches!(
    dispatcher.route("relative", write_ok).unwrap_err(),
    CourierError::Route(courier::RouteError::PathNotAbsolute(_))
  ));
  assert!(matches!(
    dispatcher.route("/a/:", write_ok).unwrap_err(),
    CourierError::Route(courier::RouteError::EmptyParameterName(_))
  ));
}

#[test]
fn regex_routes_match_verbatim() {
  let mut dispatcher = Dispatcher::new();
  let pattern = regex::Regex::new("/plugin/(?P<version>[0-9.]+)/time").unwrap();

  fn version(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    let version = ctx.param("version").unwrap_or_default().to_string();
    ctx.send(Value::String(version));
    Ok(())
  }

  dispatcher.route(pattern, version).unwrap();

  let ctx = dispatcher.dispatch("/plugin/1.0.0/time", json!({})).unwrap();
  assert_eq!(bodies(&ctx), vec![json!("1.0.0")]);

  let err = dispatcher.dispatch("/plugin/abc/time", json!({})).unwrap_err();
  assert!(matches!(err, CourierError::Rpc(rpc) if rpc.is_not_found()));
}

#[test]
fn payload_defaults_to_an_empty_object() {
  fn inspect(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
    let payload = ctx.payload().clone();
    ctx.send(payload);
    Ok(())
  }

  let mut dispatcher = Dispatcher::new();
  dispatcher.route("/inspect", inspect).unwrap();

  let ctx = dispatcher.dispatch("/inspect", Value::Null).unwrap();
  assert_eq!(bodies(&ctx), vec![json!({})]);
}
