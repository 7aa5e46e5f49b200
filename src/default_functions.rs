use crate::courier_error::{CourierError, CourierResult};
use crate::http;

/// The default error handler for the HTTP chain.
/// This can be overridden with `with_error_handler` when building the server.
pub(crate) fn default_error_handler(
  request: &mut http::RequestContext,
  error: CourierError,
) -> CourierResult<http::Response> {
  log::error!(
    "request {} internal server error {} {} {:?}",
    request.id(),
    request.head().method(),
    request.head().path(),
    error
  );
  Ok(http::Response::new(http::StatusCode::InternalServerError))
}

pub(crate) fn default_not_found_handler(
  request: &mut http::RequestContext,
) -> CourierResult<http::Response> {
  log::info!(
    "request {} not found {} {}",
    request.id(),
    request.head().method(),
    request.head().path()
  );
  Ok(http::Response::not_found())
}
