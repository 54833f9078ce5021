//! Proxy listener
//!
//! Accepts client connections and spawns one handler task per connection.
//! There is no connection limit and no draining: on shutdown the accept loop
//! stops and in-flight connections end with the process.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::cache::{MemoryCacheStore, ResponseCache};
use crate::config::ProxyServerConfig;
use crate::error::Result;
use crate::proxy::forwarder::{Forwarder, ForwarderConfig};
use crate::proxy::handler::ConnectionHandler;
use crate::proxy::tunnel::{TunnelConfig, TunnelRelay};

/// Proxy server
pub struct ProxyServer {
    config: ProxyServerConfig,
    handler: Arc<ConnectionHandler>,
}

impl ProxyServer {
    /// Create a new proxy server forwarding to origins on port 80
    pub fn new(config: ProxyServerConfig, cache: ResponseCache) -> Self {
        ProxyServerBuilder::new(config).cache(cache).build()
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        info!("Proxy server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and run until shutdown is signalled
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until shutdown is signalled
    #[instrument(skip(self, listener, shutdown))]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => self.spawn_handler(stream, client_addr),
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_handler(&self, stream: tokio::net::TcpStream, client_addr: SocketAddr) {
        debug!("Connection from {}", client_addr);

        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle(stream, client_addr).await;
        });
    }
}

/// Builder for creating a proxy server
pub struct ProxyServerBuilder {
    config: ProxyServerConfig,
    cache: Option<ResponseCache>,
    origin_port: u16,
}

impl ProxyServerBuilder {
    pub fn new(config: ProxyServerConfig) -> Self {
        Self {
            config,
            cache: None,
            origin_port: ForwarderConfig::default().origin_port,
        }
    }

    pub fn cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Port GET/POST requests are forwarded to; only loopback test origins need this
    pub fn origin_port(mut self, port: u16) -> Self {
        self.origin_port = port;
        self
    }

    /// Build the server; without an explicit cache an in-memory one is used
    pub fn build(self) -> ProxyServer {
        let cache = self
            .cache
            .unwrap_or_else(|| ResponseCache::new(Arc::new(MemoryCacheStore::new())));

        let forwarder = Forwarder::new(ForwarderConfig {
            origin_port: self.origin_port,
            connect_timeout: self.config.connect_timeout(),
            read_timeout: self.config.read_timeout(),
        });
        let tunnel = TunnelRelay::new(TunnelConfig {
            connect_timeout: self.config.connect_timeout(),
            idle_timeout: self.config.tunnel_idle_timeout(),
        });

        ProxyServer {
            config: self.config,
            handler: Arc::new(ConnectionHandler::new(cache, forwarder, tunnel)),
        }
    }
}
