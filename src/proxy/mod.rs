//! Forward proxy engine
//!
//! This module provides the request-handling and tunneling core:
//! - Request-line parsing and target normalization
//! - HTTP/1.0 forwarding to origin servers for GET and POST
//! - CONNECT tunnel for HTTPS with idle-timeout teardown
//! - Per-connection orchestration and the accept loop

pub mod forwarder;
pub mod handler;
pub mod request;
pub mod server;
pub mod tunnel;

#[cfg(test)]
pub(crate) mod test_support;

pub use forwarder::{Forwarder, ForwarderConfig, UpstreamResponse};
pub use handler::ConnectionHandler;
pub use request::{Method, ParsedRequest, Target};
pub use server::{ProxyServer, ProxyServerBuilder};
pub use tunnel::{TunnelConfig, TunnelRelay, TunnelStats};
