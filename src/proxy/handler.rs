//! Per-connection request handling
//!
//! One call to [`ConnectionHandler::handle`] owns one client connection from
//! the first read to the final close. Every failure is turned into an HTTP
//! error page here; nothing propagates to the listener.

use std::net::SocketAddr;

use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::error::{error_page, Result, WaypostError};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::request::{parse_authority, Method, ParsedRequest, Target};
use crate::proxy::tunnel::TunnelRelay;

/// Size of the single read that must contain the request head
pub const REQUEST_BUFFER_SIZE: usize = 8 * 1024;

pub struct ConnectionHandler {
    cache: ResponseCache,
    forwarder: Forwarder,
    tunnel: TunnelRelay,
}

impl ConnectionHandler {
    pub fn new(cache: ResponseCache, forwarder: Forwarder, tunnel: TunnelRelay) -> Self {
        Self {
            cache,
            forwarder,
            tunnel,
        }
    }

    /// Serve one client connection, then close it.
    #[instrument(skip(self, client), fields(client = %client_addr))]
    pub async fn handle<S>(&self, mut client: S, client_addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if let Err(e) = self.process(&mut client).await {
            error!("Error handling client: {}", e);
            let page = error_page(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            let _ = client.write_all(&page).await;
        }

        let _ = client.shutdown().await;
    }

    async fn process<S>(&self, client: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut buffer = vec![0u8; REQUEST_BUFFER_SIZE];
        let n = client.read(&mut buffer).await?;
        if n == 0 {
            debug!("Client disconnected before sending a request");
            return Ok(());
        }

        let request = match ParsedRequest::parse(&buffer[..n]) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting request: {}", e);
                return reply_error(client, &e).await;
            }
        };
        info!(request = %request.request_line(), "Request received");

        if request.method == Method::Connect {
            return self.open_tunnel(client, &request.target).await;
        }

        self.serve(client, request).await
    }

    async fn open_tunnel<S>(&self, client: &mut S, authority: &str) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (host, port) = match parse_authority(authority) {
            Ok(target) => target,
            Err(e) => {
                warn!("Rejecting CONNECT: {}", e);
                return reply_error(client, &e).await;
            }
        };
        info!(host = %host, port = port, "Method: CONNECT");

        // The relay already answered the client with 502 on connect failure.
        if let Err(e) = self.tunnel.establish(client, &host, port).await {
            debug!("Tunnel not established: {}", e);
        }
        Ok(())
    }

    async fn serve<S>(&self, client: &mut S, request: ParsedRequest) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let target = Target::from_request_target(&request.target);
        info!(
            method = %request.method,
            host = %target.hostname,
            path = %target.path,
            "Forwarding request"
        );

        let cache_key = match &request.method {
            Method::Get => Some(CacheKey::for_get(&target.normalized)),
            Method::Post if self.cache.post_cache_enabled() => {
                Some(CacheKey::for_post(&request.target, &request.body))
            }
            Method::Post => None,
            other => {
                let e = WaypostError::UnsupportedMethod(other.to_string());
                warn!("Rejecting request: {}", e);
                return reply_error(client, &e).await;
            }
        };

        if let Some(key) = &cache_key {
            if let Some(entry) = self.cache.lookup(key).await {
                info!(key = %key, bytes = entry.len(), "Cache HIT");
                client.write_all(&entry.content).await?;
                return Ok(());
            }
            info!(key = %key, "Cache MISS");
        }

        let response = match self
            .forwarder
            .forward(&request.method, &target.hostname, &target.path, &request.body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if e.is_upstream() {
                    warn!(host = %target.hostname, "Upstream request failed: {}", e);
                } else {
                    error!(host = %target.hostname, "Forwarding failed: {}", e);
                }
                return reply_error(client, &e).await;
            }
        };

        if let Some(key) = &cache_key {
            if !response.bytes.is_empty() {
                self.cache
                    .store(key, response.bytes.clone(), &response.content_type)
                    .await;
            }
        }

        client.write_all(&response.bytes).await?;
        debug!(bytes = response.bytes.len(), "Response sent to client");
        Ok(())
    }
}

async fn reply_error<S>(client: &mut S, err: &WaypostError) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    client.write_all(&err.error_page()).await?;
    Ok(())
}
