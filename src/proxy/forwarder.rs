//! Upstream forwarding for GET and POST
//!
//! Each request gets a fresh HTTP/1.0 connection to the origin with
//! `Connection: close`; the whole response is buffered until the origin
//! closes, then handed back untouched.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, instrument};

use crate::error::{Result, WaypostError};
use crate::proxy::request::{find_subsequence, Method};

/// Content type assumed when the origin does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

const READ_CHUNK_SIZE: usize = 4096;

/// Configuration for the upstream forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Origin port; plain HTTP only
    pub origin_port: u16,
    /// Timeout for name resolution plus TCP connect
    pub connect_timeout: Duration,
    /// Timeout for each individual write or read
    pub read_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            origin_port: 80,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete origin response plus its declared content type
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub bytes: Bytes,
    pub content_type: String,
}

pub struct Forwarder {
    config: ForwarderConfig,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Self { config }
    }

    /// Send `method path` to `hostname` and buffer the full response
    #[instrument(skip(self, body), fields(method = %method, port = self.config.origin_port))]
    pub async fn forward(
        &self,
        method: &Method,
        hostname: &str,
        path: &str,
        body: &[u8],
    ) -> Result<UpstreamResponse> {
        let mut stream = self.connect(hostname).await?;
        debug!("Connected to origin");

        let request = build_request(method, hostname, path, body);
        timeout(self.config.read_timeout, stream.write_all(&request))
            .await
            .map_err(|_| timed_out(hostname))?
            .map_err(|e| classify_io_error(hostname, e))?;

        let bytes = self.read_to_close(&mut stream, hostname).await?;
        let content_type = extract_content_type(&bytes);

        debug!(bytes = bytes.len(), content_type = %content_type, "Received origin response");

        Ok(UpstreamResponse {
            bytes,
            content_type,
        })
    }

    async fn connect(&self, hostname: &str) -> Result<TcpStream> {
        if hostname.is_empty() {
            return Err(WaypostError::DnsFailure {
                host: hostname.to_string(),
            });
        }

        let addrs: Vec<_> = timeout(
            self.config.connect_timeout,
            lookup_host((hostname, self.config.origin_port)),
        )
        .await
        .map_err(|_| timed_out(hostname))?
        .map_err(|_| WaypostError::DnsFailure {
            host: hostname.to_string(),
        })?
        .collect();

        let mut last_error = None;
        for addr in addrs {
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    debug!(%addr, error = %e, "Origin address failed");
                    last_error = Some(e);
                }
                Err(_) => return Err(timed_out(hostname)),
            }
        }

        match last_error {
            Some(e) => Err(classify_io_error(hostname, e)),
            None => Err(WaypostError::DnsFailure {
                host: hostname.to_string(),
            }),
        }
    }

    async fn read_to_close(&self, stream: &mut TcpStream, hostname: &str) -> Result<Bytes> {
        let mut response = BytesMut::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let n = timeout(self.config.read_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| timed_out(hostname))?
                .map_err(|e| classify_io_error(hostname, e))?;

            if n == 0 {
                return Ok(response.freeze());
            }
            response.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Build the HTTP/1.0 request sent to the origin
pub fn build_request(method: &Method, hostname: &str, path: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!("{} {} HTTP/1.0\r\nHost: {}\r\n", method, path, hostname);

    if *method == Method::Post {
        request.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    request.push_str("Connection: close\r\n\r\n");

    let mut request = request.into_bytes();
    if *method == Method::Post {
        request.extend_from_slice(body);
    }
    request
}

/// Content-Type of a raw response, or [`DEFAULT_CONTENT_TYPE`]
pub fn extract_content_type(response: &[u8]) -> String {
    let Some(header_end) = find_subsequence(response, b"\r\n\r\n") else {
        return DEFAULT_CONTENT_TYPE.to_string();
    };

    String::from_utf8_lossy(&response[..header_end])
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-type")
                .then(|| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}

fn timed_out(hostname: &str) -> WaypostError {
    WaypostError::UpstreamTimeout {
        host: hostname.to_string(),
    }
}

fn classify_io_error(hostname: &str, err: io::Error) -> WaypostError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => WaypostError::ConnectionRefused {
            host: hostname.to_string(),
        },
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => timed_out(hostname),
        _ => WaypostError::Upstream(err.to_string()),
    }
}
