//! The minimal HTTP/1.1 front door: request head parsing, responses and the
//! per-request context handed to middlewares.

pub mod headers;
pub mod method;
pub mod request;
pub mod response;
pub mod status;

pub use headers::Headers;
pub use method::Method;
pub use request::{HttpVersion, RequestContext, RequestHead};
pub use response::Response;
pub use status::StatusCode;
