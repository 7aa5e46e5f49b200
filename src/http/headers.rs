//! A small ordered header multimap. Header names compare case insensitively,
//! insertion order is preserved on the wire.

/// The headers of a request or response.
#[derive(Debug, Clone, Default)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
  /// An empty header set.
  pub fn new() -> Self {
    Headers(Vec::new())
  }

  /// The first value of the named header.
  pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
    let name = name.as_ref();
    self
      .0
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  /// Appends a header, keeping any existing values of the same name.
  pub fn push(&mut self, name: impl ToString, value: impl ToString) {
    self.0.push((name.to_string(), value.to_string()));
  }

  /// Replaces all values of the named header with one value.
  pub fn set(&mut self, name: impl AsRef<str> + ToString, value: impl ToString) {
    let key = name.as_ref();
    self.0.retain(|(existing, _)| !existing.eq_ignore_ascii_case(key));
    self.0.push((name.to_string(), value.to_string()));
  }

  /// Iterates over all name/value pairs in insertion order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
  }

  /// True if the set contains no headers.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}
