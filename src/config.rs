use crate::error::{Result, WaypostError};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy listener and upstream configuration
    pub proxy: ProxyServerConfig,
    /// Response cache configuration
    pub cache: CacheConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port for the proxy server (default: 8888)
    pub port: u16,
    /// Upstream connect timeout in seconds
    pub connect_timeout: u64,
    /// Upstream read timeout in seconds
    pub read_timeout: u64,
    /// Seconds a CONNECT tunnel may sit without traffic before it is torn down
    pub tunnel_idle_timeout: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Sqlite => "sqlite",
            CacheBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Storage used for GET responses
    pub backend: CacheBackend,
    /// SQLite database file (sqlite backend only)
    pub db_path: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Cache POST responses in memory, keyed by body digest
    pub post_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            proxy: ProxyServerConfig {
                host: get_env_or("PROXY_HOST", "0.0.0.0"),
                port: get_env_or("PROXY_PORT", "8888").parse().map_err(|_| {
                    WaypostError::InvalidConfig("PROXY_PORT must be a valid port number".into())
                })?,
                connect_timeout: parse_secs("PROXY_CONNECT_TIMEOUT", "10")?,
                read_timeout: parse_secs("PROXY_READ_TIMEOUT", "10")?,
                tunnel_idle_timeout: parse_secs("PROXY_TUNNEL_IDLE_TIMEOUT", "60")?,
            },
            cache: CacheConfig {
                backend: parse_cache_backend(&get_env_or("CACHE_BACKEND", "sqlite"))?,
                db_path: get_env_or("CACHE_DB_PATH", "proxy_cache.db"),
                max_connections: get_env_or("CACHE_MAX_CONNECTIONS", "4").parse().map_err(
                    |_| {
                        WaypostError::InvalidConfig(
                            "CACHE_MAX_CONNECTIONS must be a valid number".into(),
                        )
                    },
                )?,
                post_enabled: get_env_or("CACHE_POST_ENABLED", "false")
                    .parse()
                    .unwrap_or(false),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Apply command-line values on top of the environment; `None` keeps the env value
    pub fn with_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        db_path: Option<String>,
    ) -> Self {
        if let Some(host) = host {
            self.proxy.host = host;
        }
        if let Some(port) = port {
            self.proxy.port = port;
        }
        if let Some(db_path) = db_path {
            self.cache.db_path = db_path;
        }
        self
    }

    /// Get the proxy server address
    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.proxy.host, self.proxy.port)
    }
}

impl ProxyServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn tunnel_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_idle_timeout)
    }
}

impl CacheConfig {
    /// Get the SQLite connection URL
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path)
    }
}

fn parse_cache_backend(raw: &str) -> Result<CacheBackend> {
    match raw.trim().to_lowercase().as_str() {
        "sqlite" => Ok(CacheBackend::Sqlite),
        "memory" => Ok(CacheBackend::Memory),
        other => Err(WaypostError::InvalidConfig(format!(
            "CACHE_BACKEND has unsupported value: {}",
            other
        ))),
    }
}

fn parse_secs(key: &str, default: &str) -> Result<u64> {
    let secs: u64 = get_env_or(key, default)
        .parse()
        .map_err(|_| WaypostError::InvalidConfig(format!("{} must be a number of seconds", key)))?;

    if secs == 0 {
        return Err(WaypostError::InvalidConfig(format!(
            "{} must be greater than zero",
            key
        )));
    }

    Ok(secs)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
