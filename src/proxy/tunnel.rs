//! CONNECT tunnel for HTTPS proxying
//!
//! After the origin connection succeeds the client gets a bare
//! `200 Connection Established` and both sockets become symmetric peers.
//! Bytes are relayed verbatim, never inspected. The session ends as soon as
//! either side closes or errors, when neither side has sent anything for
//! the idle timeout, or when a forwarded chunk cannot be delivered within it.
//! There is no half-close continuation.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, WaypostError};

pub const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
pub const TUNNEL_FAILED: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

const RELAY_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for CONNECT tunnels
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Origin,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Origin => f.write_str("origin"),
        }
    }
}

/// Why a relay session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed(Side),
    IdleTimeout,
    ReadFailed(Side),
    WriteFailed(Side),
    /// The receiving side stopped draining for a whole idle period
    WriteStalled(Side),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed(side) => write!(f, "{} closed", side),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::ReadFailed(side) => write!(f, "read from {} failed", side),
            CloseReason::WriteFailed(side) => write!(f, "write to {} failed", side),
            CloseReason::WriteStalled(side) => write!(f, "write to {} stalled", side),
        }
    }
}

enum RelayState {
    Relaying,
    Closing(CloseReason),
}

/// Byte counts and outcome of a finished relay session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelStats {
    pub client_to_origin: u64,
    pub origin_to_client: u64,
    pub close_reason: CloseReason,
}

struct RelayBuffers {
    client: Vec<u8>,
    origin: Vec<u8>,
    client_to_origin: u64,
    origin_to_client: u64,
}

/// Handles CONNECT tunnel requests
pub struct TunnelRelay {
    config: TunnelConfig,
}

impl TunnelRelay {
    pub fn new(config: TunnelConfig) -> Self {
        Self { config }
    }

    /// Open the origin connection, answer the client, and relay until the session ends.
    ///
    /// Only the connect step can be reported to the client (as a bare 502);
    /// once tunneling starts failures just end the session.
    #[instrument(skip(self, client))]
    pub async fn establish<C>(&self, client: &mut C, host: &str, port: u16) -> Result<TunnelStats>
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut origin = match self.connect(host, port).await {
            Ok(origin) => origin,
            Err(e) => {
                warn!("CONNECT tunnel error: {}", e);
                let _ = client.write_all(TUNNEL_FAILED).await;
                return Err(e);
            }
        };

        client.write_all(TUNNEL_ESTABLISHED).await?;
        info!("Tunnel established to {}:{}", host, port);

        let stats = self.relay(client, &mut origin).await;
        info!(
            client_to_origin = stats.client_to_origin,
            origin_to_client = stats.origin_to_client,
            reason = %stats.close_reason,
            "Tunnel closed"
        );

        Ok(stats)
    }

    /// Connect to the tunnel target within the connect timeout
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let target = format!("{}:{}", host, port);
        debug!("Tunneling to {}", target);

        match timeout(self.config.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(WaypostError::TunnelConnect {
                target,
                reason: e.to_string(),
            }),
            Err(_) => Err(WaypostError::TunnelConnect {
                target,
                reason: "connect timed out".to_string(),
            }),
        }
    }

    /// Pump bytes between `client` and `origin` until a terminal condition,
    /// then shut both down.
    pub async fn relay<C, O>(&self, client: &mut C, origin: &mut O) -> TunnelStats
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
        O: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut buffers = RelayBuffers {
            client: vec![0u8; RELAY_CHUNK_SIZE],
            origin: vec![0u8; RELAY_CHUNK_SIZE],
            client_to_origin: 0,
            origin_to_client: 0,
        };

        let close_reason = loop {
            match self.step(client, origin, &mut buffers).await {
                RelayState::Relaying => continue,
                RelayState::Closing(reason) => break reason,
            }
        };

        let _ = client.shutdown().await;
        let _ = origin.shutdown().await;

        TunnelStats {
            client_to_origin: buffers.client_to_origin,
            origin_to_client: buffers.origin_to_client,
            close_reason,
        }
    }

    /// Wait for either socket to become readable, then forward one chunk.
    async fn step<C, O>(&self, client: &mut C, origin: &mut O, buffers: &mut RelayBuffers) -> RelayState
    where
        C: AsyncRead + AsyncWrite + Unpin + Send,
        O: AsyncRead + AsyncWrite + Unpin + Send,
    {
        // Both reads are cancel safe, so the losing branch loses no data.
        let ready = timeout(self.config.idle_timeout, async {
            tokio::select! {
                result = client.read(&mut buffers.client) => (Side::Client, result),
                result = origin.read(&mut buffers.origin) => (Side::Origin, result),
            }
        })
        .await;

        let (side, n) = match ready {
            Err(_) => return RelayState::Closing(CloseReason::IdleTimeout),
            Ok((side, Err(e))) => {
                debug!(%side, error = %e, "Tunnel read failed");
                return RelayState::Closing(CloseReason::ReadFailed(side));
            }
            Ok((side, Ok(0))) => return RelayState::Closing(CloseReason::PeerClosed(side)),
            Ok((side, Ok(n))) => (side, n),
        };

        let (peer, written) = match side {
            Side::Client => (
                Side::Origin,
                timeout(self.config.idle_timeout, origin.write_all(&buffers.client[..n])).await,
            ),
            Side::Origin => (
                Side::Client,
                timeout(self.config.idle_timeout, client.write_all(&buffers.origin[..n])).await,
            ),
        };

        match written {
            Ok(Ok(())) => {
                match side {
                    Side::Client => buffers.client_to_origin += n as u64,
                    Side::Origin => buffers.origin_to_client += n as u64,
                }
                RelayState::Relaying
            }
            Ok(Err(e)) => {
                debug!(side = %peer, error = %e, "Tunnel write failed");
                RelayState::Closing(CloseReason::WriteFailed(peer))
            }
            Err(_) => RelayState::Closing(CloseReason::WriteStalled(peer)),
        }
    }
}
