//! Response construction and serialization.

use crate::courier_error::CourierResult;
use crate::http::headers::Headers;
use crate::http::request::HttpVersion;
use crate::http::status::StatusCode;
use crate::stream::ConnectionStream;
use serde_json::Value;

/// A response to a plain HTTP request.
#[derive(Debug)]
pub struct Response {
  /// The status code of the response.
  pub status: StatusCode,
  /// The headers of the response.
  pub headers: Headers,
  /// The body bytes, if any.
  pub body: Option<Vec<u8>>,
}

impl Response {
  /// An empty response with the given status.
  pub fn new(status: impl Into<StatusCode>) -> Self {
    Response { status: status.into(), headers: Headers::new(), body: None }
  }

  /// A JSON response.
  pub fn json(status: impl Into<StatusCode>, body: &Value) -> CourierResult<Response> {
    Ok(
      Response::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::to_vec(body)?),
    )
  }

  /// A plain text response.
  pub fn text(status: impl Into<StatusCode>, body: impl ToString) -> Response {
    Response::new(status)
      .with_header("Content-Type", "text/plain; charset=utf-8")
      .with_body(body.to_string().into_bytes())
  }

  /// 404 without a body.
  pub fn not_found() -> Response {
    Response::new(StatusCode::NotFound)
  }

  /// Builder-style header append.
  pub fn with_header(mut self, name: impl ToString, value: impl ToString) -> Self {
    self.headers.push(name, value);
    self
  }

  /// Builder-style body replacement.
  pub fn with_body(mut self, body: Vec<u8>) -> Self {
    self.body = Some(body);
    self
  }

  /// Serializes the response to the stream. Content-Length is always written
  /// so the client can keep the connection alive.
  pub fn write_to(&self, version: HttpVersion, stream: &dyn ConnectionStream) -> CourierResult<()> {
    let mut head = format!(
      "{} {} {}\r\n",
      version.as_net_str(),
      self.status.code(),
      self.status.reason()
    );

    for (name, value) in self.headers.iter() {
      head.push_str(name);
      head.push_str(": ");
      head.push_str(value);
      head.push_str("\r\n");
    }

    let body = self.body.as_deref().unwrap_or_default();
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

    stream.write_all(head.as_bytes())?;
    if !body.is_empty() {
      stream.write_all(body)?;
    }
    stream.flush()?;
    Ok(())
  }
}
