//! Waypost - caching forward proxy
//!
//! A forward HTTP proxy that fetches resources on the client's behalf and
//! tunnels HTTPS through CONNECT.
//!
//! ## Features
//!
//! - GET and POST forwarding to origin servers over HTTP/1.0
//! - Verbatim response cache for GET, durable (SQLite) or in-memory
//! - Optional in-memory POST cache keyed by request body digest
//! - Opaque CONNECT tunneling with idle timeout

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use database::Database;
pub use error::{Result, WaypostError};
