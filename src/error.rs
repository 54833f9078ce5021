use http::StatusCode;
use thiserror::Error;

/// Unified error type for the Waypost proxy
#[derive(Error, Debug)]
pub enum WaypostError {
    // Client request errors
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    // Upstream errors
    #[error("Upstream {host} timed out")]
    UpstreamTimeout { host: String },

    #[error("DNS resolution failed for {host}")]
    DnsFailure { host: String },

    #[error("Connection refused by {host}")]
    ConnectionRefused { host: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    // Tunnel errors
    #[error("CONNECT to {target} failed: {reason}")]
    TunnelConnect { target: String, reason: String },

    // Cache backend errors
    #[error("Cache error: {0}")]
    Cache(#[from] sqlx::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Waypost operations
pub type Result<T> = std::result::Result<T, WaypostError>;

impl WaypostError {
    /// Get the HTTP status code reported to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            WaypostError::MalformedRequest(_) => StatusCode::BAD_REQUEST,

            // 501 Not Implemented
            WaypostError::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,

            // 502 Bad Gateway
            WaypostError::DnsFailure { .. }
            | WaypostError::ConnectionRefused { .. }
            | WaypostError::Upstream(_)
            | WaypostError::TunnelConnect { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            WaypostError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            WaypostError::Cache(_)
            | WaypostError::InvalidConfig(_)
            | WaypostError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error was caused by the origin server rather than the client or proxy
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            WaypostError::UpstreamTimeout { .. }
                | WaypostError::DnsFailure { .. }
                | WaypostError::ConnectionRefused { .. }
                | WaypostError::Upstream(_)
                | WaypostError::TunnelConnect { .. }
        )
    }

    /// Human-readable explanation placed in the body of the error page
    pub fn client_message(&self) -> String {
        match self {
            WaypostError::MalformedRequest(_) => "Invalid HTTP request".to_string(),
            WaypostError::UnsupportedMethod(method) => {
                format!("Method {} is not supported", method)
            }
            WaypostError::UpstreamTimeout { .. } => "Server took too long to respond".to_string(),
            WaypostError::DnsFailure { host } => format!("Could not resolve hostname: {}", host),
            WaypostError::ConnectionRefused { host } => format!("Connection refused by {}", host),
            WaypostError::Upstream(reason) => format!("Error connecting to server: {}", reason),
            other => other.to_string(),
        }
    }

    /// Render the complete HTTP/1.0 error response sent to the client
    pub fn error_page(&self) -> Vec<u8> {
        error_page(self.status_code(), &self.client_message())
    }
}

/// Build an HTTP/1.0 error response with a small HTML body
pub fn error_page(status: StatusCode, message: &str) -> Vec<u8> {
    let status_line = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );

    format!(
        "HTTP/1.0 {status}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
         <html><body><h1>{status}</h1><p>{message}</p></body></html>",
        status = status_line,
        message = message,
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            WaypostError::MalformedRequest("empty".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WaypostError::UnsupportedMethod("PUT".to_string()).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            WaypostError::UpstreamTimeout {
                host: "example.com".to_string()
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            WaypostError::DnsFailure {
                host: "example.com".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WaypostError::ConnectionRefused {
                host: "example.com".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WaypostError::Upstream("reset".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            WaypostError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_is_upstream() {
        assert!(WaypostError::Upstream("reset".to_string()).is_upstream());
        assert!(WaypostError::DnsFailure {
            host: "x".to_string()
        }
        .is_upstream());
        assert!(!WaypostError::MalformedRequest("x".to_string()).is_upstream());
        assert!(!WaypostError::InvalidConfig("x".to_string()).is_upstream());
    }

    #[test]
    fn test_error_page_format() {
        let page = WaypostError::UnsupportedMethod("PUT".to_string()).error_page();
        let page = String::from_utf8(page).unwrap();

        assert!(page.starts_with("HTTP/1.0 501 Not Implemented\r\n"));
        assert!(page.contains("\r\nContent-Type: text/html\r\n"));
        assert!(page.contains("\r\nConnection: close\r\n\r\n"));
        assert!(page.ends_with(
            "<html><body><h1>501 Not Implemented</h1><p>Method PUT is not supported</p></body></html>"
        ));
    }

    #[test]
    fn test_client_messages_name_the_host() {
        let err = WaypostError::DnsFailure {
            host: "nowhere.invalid".to_string(),
        };
        assert_eq!(err.client_message(), "Could not resolve hostname: nowhere.invalid");

        let err = WaypostError::ConnectionRefused {
            host: "localhost".to_string(),
        };
        assert_eq!(err.client_message(), "Connection refused by localhost");
    }
}
