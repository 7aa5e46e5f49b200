//! HTTP request methods.

use std::fmt::{Display, Formatter};

/// The method of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
  /// GET
  Get,
  /// HEAD
  Head,
  /// POST
  Post,
  /// PUT
  Put,
  /// DELETE
  Delete,
  /// OPTIONS
  Options,
  /// PATCH
  Patch,
  /// Anything else, verbatim.
  Custom(String),
}

impl Method {
  /// Parses a method token. Methods are case sensitive per RFC 9110.
  pub fn from_token(token: &str) -> Method {
    match token {
      "GET" => Method::Get,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "DELETE" => Method::Delete,
      "OPTIONS" => Method::Options,
      "PATCH" => Method::Patch,
      other => Method::Custom(other.to_string()),
    }
  }

  /// The token of this method.
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
      Method::Patch => "PATCH",
      Method::Custom(token) => token.as_str(),
    }
  }

  /// True if requests with this method conventionally carry a body the daemon
  /// should read.
  pub fn has_body(&self) -> bool {
    matches!(self, Method::Post | Method::Put | Method::Patch)
  }
}

impl Display for Method {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
