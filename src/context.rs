//! The per-request carrier and its response sink.

use crate::service::ClientHandle;
use crate::util::unwrap_poison;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::io;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::{Arc, Mutex};

/// What the client asked the dispatcher to do with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
  /// One request, one response.
  #[default]
  Call,
  /// Open an event stream.
  Subscribe,
  /// Close a previously opened event stream.
  Unsubscribe,
}

/// One element of the response stream. `status` is the request status at the
/// time of the write; transports only serialize it on the first element.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
  /// HTTP-style status.
  pub status: u16,
  /// The message body.
  pub body: Value,
}

/// Receives response messages as they are pushed. Transports attach one of
/// these to forward messages straight to the wire.
pub trait SinkWriter: Send {
  /// Forward one message. An error permanently closes the sink.
  fn write(&mut self, message: &ResponseMessage) -> io::Result<()>;
}

struct SinkState {
  buffered: VecDeque<ResponseMessage>,
  writer: Option<Box<dyn SinkWriter>>,
}

struct SinkInner {
  closed: AtomicBool,
  pushed: AtomicUsize,
  state: Mutex<SinkState>,
}

/// The object-mode response stream of a [Context]. Clones share state, writes
/// are serialized, and everything pushed after [ResponseSink::close] is a
/// silent no-op so handlers never have to care whether the client is still
/// there.
#[derive(Clone)]
pub struct ResponseSink {
  inner: Arc<SinkInner>,
}

impl Debug for ResponseSink {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("ResponseSink(closed={})", self.is_closed()))
  }
}

impl Default for ResponseSink {
  fn default() -> Self {
    Self::new()
  }
}

impl ResponseSink {
  /// A fresh sink buffering messages until a writer is attached or they are drained.
  pub fn new() -> Self {
    ResponseSink {
      inner: Arc::new(SinkInner {
        closed: AtomicBool::new(false),
        pushed: AtomicUsize::new(0),
        state: Mutex::new(SinkState { buffered: VecDeque::new(), writer: None }),
      }),
    }
  }

  /// Pushes one message. Returns false if the sink is closed or the attached
  /// writer failed; the message is dropped in that case.
  pub fn push(&self, message: ResponseMessage) -> bool {
    if self.is_closed() {
      log::trace!("response sink is closed, dropping message");
      return false;
    }

    let Ok(mut state) = unwrap_poison(self.inner.state.lock()) else {
      return false;
    };

    if let Some(writer) = state.writer.as_mut() {
      if let Err(err) = writer.write(&message) {
        log::debug!("response sink writer failed, closing: {err}");
        self.inner.closed.store(true, SeqCst);
        return false;
      }
      self.inner.pushed.fetch_add(1, SeqCst);
      return true;
    }

    state.buffered.push_back(message);
    self.inner.pushed.fetch_add(1, SeqCst);
    true
  }

  /// How many messages were successfully pushed over the sink's lifetime.
  pub fn write_count(&self) -> usize {
    self.inner.pushed.load(SeqCst)
  }

  /// Attaches a writer. Anything buffered so far is flushed through it first,
  /// every later push is forwarded immediately.
  pub fn attach_writer(&self, mut writer: Box<dyn SinkWriter>) -> io::Result<()> {
    let mut state = unwrap_poison(self.inner.state.lock())?;
    while let Some(message) = state.buffered.pop_front() {
      writer.write(&message)?;
    }
    state.writer = Some(writer);
    Ok(())
  }

  /// Removes and returns all buffered messages.
  pub fn drain(&self) -> Vec<ResponseMessage> {
    match unwrap_poison(self.inner.state.lock()) {
      Ok(mut state) => state.buffered.drain(..).collect(),
      Err(_) => Vec::new(),
    }
  }

  /// Closes the sink. Idempotent.
  pub fn close(&self) {
    self.inner.closed.store(true, SeqCst);
  }

  /// True once [ResponseSink::close] was called or a writer failed.
  pub fn is_closed(&self) -> bool {
    self.inner.closed.load(SeqCst)
  }

  /// True if no message is currently buffered.
  pub fn is_empty(&self) -> bool {
    unwrap_poison(self.inner.state.lock()).map(|s| s.buffered.is_empty()).unwrap_or(true)
  }
}

/// All state of a single dispatch. Created by a transport (or a test) and
/// threaded by reference through the route chain, so mutations made by one
/// handler are visible to the next.
#[derive(Debug)]
pub struct Context {
  path: String,
  kind: RequestKind,
  payload: Value,
  params: Option<HashMap<String, String>>,
  status: u16,
  response: ResponseSink,
  client: Option<ClientHandle>,
}

impl Context {
  /// A fresh context carrying the given payload. A null payload is normalized
  /// to an empty object.
  pub fn new(payload: Value) -> Self {
    let payload = match payload {
      Value::Null => Value::Object(Map::new()),
      other => other,
    };

    Context {
      path: String::new(),
      kind: RequestKind::Call,
      payload,
      params: None,
      status: 200,
      response: ResponseSink::new(),
      client: None,
    }
  }

  /// Sets the request kind.
  pub fn with_kind(mut self, kind: RequestKind) -> Self {
    self.kind = kind;
    self
  }

  /// Replaces the response sink.
  pub fn with_sink(mut self, sink: ResponseSink) -> Self {
    self.response = sink;
    self
  }

  /// Binds the context to a client connection.
  pub fn with_client(mut self, client: ClientHandle) -> Self {
    self.client = Some(client);
    self
  }

  /// The path currently being matched. Inside a nested dispatcher this is the
  /// tail that remains after all prefix strippings.
  pub fn path(&self) -> &str {
    self.path.as_str()
  }

  pub(crate) fn set_path(&mut self, path: impl ToString) {
    self.path = path.to_string();
  }

  /// The request kind.
  pub fn kind(&self) -> RequestKind {
    self.kind
  }

  /// The client supplied payload.
  pub fn payload(&self) -> &Value {
    &self.payload
  }

  /// A captured path parameter of the most recently matched route.
  pub fn param(&self, name: impl AsRef<str>) -> Option<&str> {
    self.params.as_ref()?.get(name.as_ref()).map(|v| v.as_str())
  }

  /// All captured path parameters, or None before any route matched.
  pub fn params(&self) -> Option<&HashMap<String, String>> {
    self.params.as_ref()
  }

  /// Called on every successful match: parameters of earlier candidate routes
  /// are discarded wholesale, never merged.
  pub(crate) fn replace_params(&mut self, captures: Vec<(String, Option<String>)>) {
    let mut map = HashMap::new();
    for (key, value) in captures {
      if let Some(value) = value {
        map.insert(key, value);
      }
    }
    self.params = Some(map);
  }

  /// The response status, 200 until someone changes it.
  pub fn status(&self) -> u16 {
    self.status
  }

  /// Sets the response status. Takes effect for messages pushed afterwards.
  pub fn set_status(&mut self, status: u16) {
    self.status = status;
  }

  /// The response sink.
  pub fn response(&self) -> &ResponseSink {
    &self.response
  }

  /// Writes one message body carrying the current status.
  pub fn send(&self, body: Value) -> bool {
    self.response.push(ResponseMessage { status: self.status, body })
  }

  /// The client connection this dispatch belongs to, if any. Absent for HTTP
  /// and direct in-process calls.
  pub fn client(&self) -> Option<&ClientHandle> {
    self.client.as_ref()
  }
}
