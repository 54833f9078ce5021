//! SQLite persistence for the response cache

mod migrations;
mod pool;

pub use pool::Database;
