//! Courier is a local daemon that exposes a path-addressed RPC surface over a
//! persistent WebSocket stream. Clients submit requests naming a virtual path
//! and the daemon routes each one through its [Dispatcher] to a registered
//! handler, which either answers once (a call) or produces an ongoing stream
//! of events (a subscription). Handlers compose: endpoints, services and
//! whole nested dispatchers can be mounted behind one transport.

#![warn(missing_docs)]

pub mod http;
pub mod websocket;

mod builtin_services;
mod context;
mod courier_builder;
mod courier_error;
mod courier_server;
mod default_functions;
mod dispatcher;
mod functional_traits;
mod http_bridge;
mod path_pattern;
mod rpc;
mod service;
mod stream;
mod util;
mod wire;

pub use builtin_services::StatusService;
pub use context::{Context, RequestKind, ResponseMessage, ResponseSink, SinkWriter};
pub use courier_builder::{ErrorHandler, NotFoundHandler, ServerBuilder};
pub use courier_error::{CourierError, CourierResult, ProtocolError, RouteError, RpcError};
pub use courier_server::{Server, DEFAULT_ADDR};
pub use dispatcher::{Dispatcher, Next};
pub use functional_traits::{
  Endpoint, HttpMiddleware, Service, ThreadAdapter, ThreadAdapterJoinHandle,
};
pub use http_bridge::DispatcherBridge;
pub use path_pattern::PathPattern;
pub use rpc::{ClientInfo, RpcEndpoint};
pub use service::{ClientHandle, ServiceDescriptor, Subscription, SubscriptionRegistry};
pub use stream::{ConnectionStream, IntoConnectionStream};
pub use wire::{RpcRequest, RpcResponse, WireFormat, PROTOCOL_VERSION};
