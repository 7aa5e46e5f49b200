//! Path pattern compilation.
//!
//! A route is registered under a literal path (`/status`), a parameterized
//! path (`/echo/:v`, modifiers `?`, `+` and `*` are supported) or a raw
//! [Regex]. All three compile down to one anchored regex plus the ordered
//! list of capture keys.

use crate::courier_error::RouteError;
use regex::Regex;
use std::fmt::{Debug, Display, Formatter};

/// A path pattern as given at registration time.
#[derive(Debug, Clone)]
pub enum PathPattern {
  /// Literal path, possibly containing `:name` segments.
  Exact(String),
  /// Raw regular expression, matched against the request path.
  Regex(Regex),
}

impl From<&str> for PathPattern {
  fn from(value: &str) -> Self {
    PathPattern::Exact(value.to_string())
  }
}

impl From<String> for PathPattern {
  fn from(value: String) -> Self {
    PathPattern::Exact(value)
  }
}

impl From<Regex> for PathPattern {
  fn from(value: Regex) -> Self {
    PathPattern::Regex(value)
  }
}

impl Display for PathPattern {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PathPattern::Exact(path) => f.write_str(path),
      PathPattern::Regex(regex) => f.write_str(regex.as_str()),
    }
  }
}

impl PathPattern {
  /// True if the pattern is a plain literal without parameters or wildcards.
  /// Only such patterns may serve as mount prefixes.
  pub fn is_literal(&self) -> bool {
    match self {
      PathPattern::Exact(path) => !path.split('/').any(|seg| seg.starts_with(':')),
      PathPattern::Regex(_) => false,
    }
  }
}

/// One successful match: where the matched prefix ends and the captured
/// parameters. A key of an unmatched optional segment maps to `None`.
pub(crate) struct PathMatch {
  pub(crate) end: usize,
  pub(crate) params: Vec<(String, Option<String>)>,
}

/// A compiled pattern. Terminal routes are end-anchored and must consume the
/// entire path, prefix routes (nested dispatchers) match only the front and
/// must stop on a segment boundary.
pub(crate) struct PathMatcher {
  regex: Regex,
  keys: Vec<String>,
  terminal: bool,
}

impl Debug for PathMatcher {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("PathMatcher({})", self.regex.as_str()))
  }
}

fn valid_param_name(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile_exact(path: &str, terminal: bool) -> Result<PathMatcher, RouteError> {
  if !path.starts_with('/') {
    return Err(RouteError::PathNotAbsolute(path.to_string()));
  }

  let mut src = String::from("^");
  let mut keys = Vec::new();
  let mut root = true;

  for segment in path.split('/').filter(|s| !s.is_empty()) {
    root = false;
    if let Some(token) = segment.strip_prefix(':') {
      let (name, modifier) = match token.chars().last() {
        Some(m @ ('?' | '+' | '*')) => (&token[..token.len() - m.len_utf8()], Some(m)),
        _ => (token, None),
      };

      if name.is_empty() {
        return Err(RouteError::EmptyParameterName(path.to_string()));
      }
      if !valid_param_name(name) {
        return Err(RouteError::InvalidParameterName(path.to_string(), name.to_string()));
      }

      match modifier {
        None => src.push_str(&format!("/(?P<{name}>[^/]+)")),
        Some('?') => src.push_str(&format!("(?:/(?P<{name}>[^/]+))?")),
        Some('+') => src.push_str(&format!("/(?P<{name}>[^/]+(?:/[^/]+)*)")),
        Some('*') => src.push_str(&format!("(?:/(?P<{name}>[^/]+(?:/[^/]+)*))?")),
        Some(_) => (),
      }
      keys.push(name.to_string());
      continue;
    }

    src.push('/');
    src.push_str(&regex::escape(segment));
  }

  if root {
    src.push('/');
    if terminal {
      src.push('$');
    }
  } else if terminal {
    src.push_str("/?$");
  }

  let regex = Regex::new(src.as_str())
    .map_err(|e| RouteError::RegexSyntaxError(path.to_string(), e.to_string()))?;

  Ok(PathMatcher { regex, keys, terminal })
}

fn compile_regex(pattern: &Regex, terminal: bool) -> Result<PathMatcher, RouteError> {
  let src = if terminal {
    format!("^(?:{})$", pattern.as_str())
  } else {
    format!("^(?:{})", pattern.as_str())
  };

  let regex = Regex::new(src.as_str())
    .map_err(|e| RouteError::RegexSyntaxError(pattern.as_str().to_string(), e.to_string()))?;

  let keys = regex.capture_names().flatten().map(|n| n.to_string()).collect();

  Ok(PathMatcher { regex, keys, terminal })
}

impl PathMatcher {
  pub(crate) fn compile(pattern: &PathPattern, terminal: bool) -> Result<PathMatcher, RouteError> {
    match pattern {
      PathPattern::Exact(path) => compile_exact(path, terminal),
      PathPattern::Regex(regex) => compile_regex(regex, terminal),
    }
  }

  /// Runs the matcher against a request path.
  pub(crate) fn matches(&self, path: &str) -> Option<PathMatch> {
    let caps = self.regex.captures(path)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 {
      return None;
    }

    let end = whole.end();
    if !self.terminal {
      // A prefix may only stop where a new segment begins.
      let on_boundary = end == path.len()
        || path.get(end..).map(|tail| tail.starts_with('/')).unwrap_or(false)
        || whole.as_str().ends_with('/');
      if !on_boundary {
        return None;
      }
    }

    let params = self
      .keys
      .iter()
      .map(|key| (key.clone(), caps.name(key).map(|m| m.as_str().to_string())))
      .collect();

    Some(PathMatch { end, params })
  }
}
