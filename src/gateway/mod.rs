//! Edge request pipeline: routing, filter chain and forwarding

pub mod context;
pub mod dispatcher;
pub mod forward;
pub mod route;

pub use context::{ClientAddr, Identity, RequestContext};
pub use dispatcher::Gateway;
pub use forward::{BackendLocator, Forwarder, HttpForwarder, StaticBackendLocator};
pub use route::{FilterKind, Route, RouteTable};
