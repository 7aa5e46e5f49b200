use courier::{http, Context, CourierError, CourierResult, Next, RpcError, Server, ServerBuilder};
use serde_json::json;
use std::io::ErrorKind;

mod mock_stream;
use mock_stream::MockStream;

fn status(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  ctx.send(json!({ "ok": true }));
  Ok(())
}

fn mirror(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  let payload = ctx.payload().clone();
  ctx.send(payload);
  Ok(())
}

fn fail(_ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  Err(CourierError::new_io(ErrorKind::Other, "disk on fire"))
}

fn teapot(_ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  Err(RpcError::new(418, "IM_A_TEAPOT", "short and stout").into())
}

fn created(ctx: &mut Context, _next: &mut Next<'_>) -> CourierResult<()> {
  ctx.set_status(201);
  ctx.send(json!({ "made": true }));
  Ok(())
}

fn sidecar(request: &mut http::RequestContext) -> Option<http::Response> {
  if request.head().path() == "/mw" {
    return Some(http::Response::text(200, "from middleware"));
  }
  None
}

fn build_server() -> Server {
  ServerBuilder::builder(|builder| {
    builder
      .dispatcher(|dispatcher| {
        dispatcher.route("/status", status)?;
        dispatcher.route("/mirror", mirror)?;
        dispatcher.route("/fail", fail)?;
        dispatcher.route("/teapot", teapot)?;
        dispatcher.route("/created", created)?;
        Ok(())
      })
      .map(|builder| builder.with_middleware(sidecar))
  })
  .expect("server builds")
}

/// Parses the written bytes into (status line, body) pairs, one per response.
fn parse_responses(raw: &[u8]) -> Vec<(String, String)> {
  let mut responses = Vec::new();
  let mut rest = raw;

  while !rest.is_empty() {
    let boundary = rest
      .windows(4)
      .position(|w| w == b"\r\n\r\n")
      .expect("response head is terminated");

    let head = String::from_utf8_lossy(&rest[..boundary]).to_string();
    let status_line = head.lines().next().unwrap_or_default().to_string();

    let length: usize = head
      .lines()
      .find_map(|line| line.strip_prefix("Content-Length: "))
      .map(|v| v.parse().expect("numeric content length"))
      .unwrap_or(0);

    let body_start = boundary + 4;
    let body = String::from_utf8_lossy(&rest[body_start..body_start + length]).to_string();
    responses.push((status_line, body));
    rest = &rest[body_start + length..];
  }

  responses
}

fn roundtrip(server: &Server, request: &str) -> Vec<(String, String)> {
  let stream = MockStream::with_str(request);
  server.handle_connection(stream.to_stream()).expect("connection is served");
  parse_responses(stream.copy_written_data().as_slice())
}

#[test]
fn get_dispatches_and_copies_status_and_body() {
  let server = build_server();
  let responses = roundtrip(&server, "GET /status HTTP/1.1\r\nHost: local\r\n\r\n");

  assert_eq!(responses.len(), 1);
  assert_eq!(responses[0].0, "HTTP/1.1 200 OK");
  assert_eq!(responses[0].1, r#"{"ok":true}"#);
}

#[test]
fn the_context_status_becomes_the_http_status() {
  let server = build_server();
  let responses = roundtrip(&server, "GET /created HTTP/1.1\r\nHost: local\r\n\r\n");
  assert_eq!(responses[0].0, "HTTP/1.1 201 OK");
  assert_eq!(responses[0].1, r#"{"made":true}"#);
}

#[test]
fn post_bodies_become_the_payload() {
  let server = build_server();
  let body = r#"{"a":1,"b":"two"}"#;
  let request =
    format!("POST /mirror HTTP/1.1\r\nHost: local\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);

  let responses = roundtrip(&server, request.as_str());
  assert_eq!(responses[0].0, "HTTP/1.1 200 OK");
  assert_eq!(responses[0].1, body);
}

#[test]
fn get_requests_dispatch_with_an_empty_payload() {
  let server = build_server();
  let responses = roundtrip(&server, "GET /mirror HTTP/1.1\r\nHost: local\r\n\r\n");
  assert_eq!(responses[0].1, "{}");
}

#[test]
fn an_unparsable_body_is_a_bad_request() {
  let server = build_server();
  let request = "POST /mirror HTTP/1.1\r\nHost: local\r\nContent-Length: 3\r\n\r\nnot";
  let responses = roundtrip(&server, request);
  assert_eq!(responses[0].0, "HTTP/1.1 400 Bad Request");
}

#[test]
fn head_requests_skip_the_dispatcher() {
  let server = build_server();
  let responses = roundtrip(&server, "HEAD /status HTTP/1.1\r\nHost: local\r\n\r\n");
  // Nothing after the bridge claims HEAD, so the not-found fallback answers.
  assert_eq!(responses[0].0, "HTTP/1.1 404 Not Found");
}

#[test]
fn unrouted_paths_fall_through_to_later_middlewares() {
  let server = build_server();

  let responses = roundtrip(&server, "GET /mw HTTP/1.1\r\nHost: local\r\n\r\n");
  assert_eq!(responses[0].0, "HTTP/1.1 200 OK");
  assert_eq!(responses[0].1, "from middleware");

  let responses = roundtrip(&server, "GET /nope HTTP/1.1\r\nHost: local\r\n\r\n");
  assert_eq!(responses[0].0, "HTTP/1.1 404 Not Found");
}

#[test]
fn taxonomy_errors_keep_their_status() {
  let server = build_server();
  let responses = roundtrip(&server, "GET /teapot HTTP/1.1\r\nHost: local\r\n\r\n");
  assert!(responses[0].0.starts_with("HTTP/1.1 418"));
  assert_eq!(responses[0].1, "short and stout");
}

#[test]
fn unknown_errors_become_a_500() {
  let server = build_server();
  let responses = roundtrip(&server, "GET /fail HTTP/1.1\r\nHost: local\r\n\r\n");
  assert!(responses[0].0.starts_with("HTTP/1.1 500"));
  assert_eq!(responses[0].1, "disk on fire");
}

#[test]
fn keep_alive_serves_a_second_request_on_the_same_connection() {
  let server = build_server();
  let responses = roundtrip(
    &server,
    "GET /status HTTP/1.1\r\nHost: local\r\nConnection: keep-alive\r\n\r\n\
     GET /created HTTP/1.1\r\nHost: local\r\n\r\n",
  );

  assert_eq!(responses.len(), 2);
  assert_eq!(responses[0].0, "HTTP/1.1 200 OK");
  assert!(responses[0].1.contains("ok"));
  assert_eq!(responses[1].0, "HTTP/1.1 201 OK");
}
