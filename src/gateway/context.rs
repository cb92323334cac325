//! Per-request state threaded through the filter chain

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
};
use std::net::IpAddr;

use crate::rate_limit::RateLimitKey;
use crate::token::Role;

/// Header names consumed and produced by the gateway
pub mod headers {
    pub const TENANT_ID: &str = "x-tenant-id";
    pub const SOCIETY_ID: &str = "x-society-id";
    pub const USER_ID: &str = "x-user-id";
    pub const USER_EMAIL: &str = "x-user-email";
    pub const USER_ROLE: &str = "x-user-role";
    pub const FORWARDED_FOR: &str = "x-forwarded-for";

    /// Headers only the gateway may set on forwarded requests
    pub const IDENTITY: [&str; 4] = [USER_ID, USER_EMAIL, USER_ROLE, SOCIETY_ID];
}

/// Caller network address, carried in request extensions for the forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

/// Identity established by the authentication filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub tenant_id: Option<String>,
}

/// Request plus everything the filters have established so far
///
/// Owned by exactly one request task.
pub struct RequestContext {
    request: Request<Body>,
    client_addr: Option<IpAddr>,
    pub tenant_id: Option<String>,
    pub identity: Option<Identity>,
    pub rate_limit_key: Option<RateLimitKey>,
}

impl RequestContext {
    pub fn new(request: Request<Body>, client_addr: Option<IpAddr>) -> Self {
        Self {
            request,
            client_addr,
            tenant_id: None,
            identity: None,
            rate_limit_key: None,
        }
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn client_addr(&self) -> Option<IpAddr> {
        self.client_addr
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// First value of a header as a non-empty trimmed string
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Replace every value of `name` with `value`
    pub fn set_header(&mut self, name: &'static str, value: HeaderValue) {
        self.request
            .headers_mut()
            .insert(HeaderName::from_static(name), value);
    }

    pub fn remove_header(&mut self, name: &str) {
        self.request.headers_mut().remove(name);
    }

    /// Finish the chain: record the client address and hand back the request
    pub fn into_request(self) -> Request<Body> {
        let mut request = self.request;
        if let Some(addr) = self.client_addr {
            request.extensions_mut().insert(ClientAddr(addr));
        }
        request
    }
}
