//! Request-line parsing and target normalization
//!
//! The proxy only looks at what it needs: method, target, the raw header
//! lines, and for POST the bytes after the header block. Nothing is decoded.

use std::fmt;

use bytes::Bytes;

use crate::error::{Result, WaypostError};

/// Port used for CONNECT targets that do not name one
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Request method as it appeared on the request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Connect,
    Other(String),
}

impl Method {
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "CONNECT" => Method::Connect,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Connect => "CONNECT",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as read off the client socket
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Target exactly as written on the request line
    pub target: String,
    /// Header lines in arrival order, without line terminators
    pub header_lines: Vec<String>,
    /// Bytes following the blank line; only populated for POST
    pub body: Bytes,
}

impl ParsedRequest {
    /// Parse a raw request buffer.
    ///
    /// Fails only when the request line lacks a method and a target. A POST
    /// without a header terminator simply has an empty body.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(buffer);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut tokens = request_line.split_whitespace();
        let (method, target) = match (tokens.next(), tokens.next()) {
            (Some(method), Some(target)) => (method, target),
            _ => {
                return Err(WaypostError::MalformedRequest(format!(
                    "request line {:?} needs a method and a target",
                    request_line
                )))
            }
        };

        let header_lines = lines
            .take_while(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let method = Method::from_token(method);
        let body = if method == Method::Post {
            find_subsequence(buffer, HEADER_TERMINATOR)
                .map(|pos| Bytes::copy_from_slice(&buffer[pos + HEADER_TERMINATOR.len()..]))
                .unwrap_or_default()
        } else {
            Bytes::new()
        };

        Ok(ParsedRequest {
            method,
            target: target.to_string(),
            header_lines,
            body,
        })
    }

    /// First line of the request, for logging
    pub fn request_line(&self) -> String {
        format!("{} {}", self.method, self.target)
    }
}

/// Origin host and path derived from a non-CONNECT target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub hostname: String,
    pub path: String,
    /// Target with the scheme or leading slash removed; the GET cache key
    pub normalized: String,
}

impl Target {
    /// Accepts `http://host/path`, `/host/path` or `host/path`.
    /// A target without a path maps to `/`.
    pub fn from_request_target(raw: &str) -> Self {
        let normalized = raw
            .strip_prefix("http://")
            .or_else(|| raw.strip_prefix('/'))
            .unwrap_or(raw);

        let (hostname, path) = match normalized.split_once('/') {
            Some((host, rest)) => (host.to_string(), format!("/{}", rest)),
            None => (normalized.to_string(), "/".to_string()),
        };

        Target {
            hostname,
            path,
            normalized: normalized.to_string(),
        }
    }
}

/// Split a CONNECT authority into host and port, defaulting to 443
pub fn parse_authority(authority: &str) -> Result<(String, u16)> {
    match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| {
                WaypostError::MalformedRequest(format!("invalid CONNECT port: {}", port_str))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), DEFAULT_TUNNEL_PORT)),
    }
}

pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_request() {
        let req = ParsedRequest::parse(
            b"GET /www.example.com/index.html HTTP/1.0\r\nHost: www.example.com\r\nAccept: */*\r\n\r\n",
        )
        .unwrap();

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/www.example.com/index.html");
        assert_eq!(
            req.header_lines,
            vec!["Host: www.example.com".to_string(), "Accept: */*".to_string()]
        );
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_method_and_target_are_first_two_tokens() {
        for (line, method, target) in [
            ("GET / HTTP/1.1", "GET", "/"),
            ("PUT   /x   HTTP/1.0", "PUT", "/x"),
            ("BREW pot", "BREW", "pot"),
            ("CONNECT example.com:443 HTTP/1.1", "CONNECT", "example.com:443"),
        ] {
            let req = ParsedRequest::parse(format!("{}\r\n\r\n", line).as_bytes()).unwrap();
            assert_eq!(req.method.as_str(), method);
            assert_eq!(req.target, target);
        }
    }

    #[test]
    fn test_target_is_not_decoded() {
        let req = ParsedRequest::parse(b"GET /example.com/a%20b?q=1 HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(req.target, "/example.com/a%20b?q=1");
    }

    #[test]
    fn test_malformed_request_lines() {
        let cases: [&[u8]; 4] = [b"", b"\r\n", b"GET\r\n\r\n", b"   \r\nHost: x\r\n\r\n"];
        for raw in cases {
            let err = ParsedRequest::parse(raw).unwrap_err();
            assert!(matches!(err, WaypostError::MalformedRequest(_)), "{:?}", raw);
        }
    }

    #[test]
    fn test_post_body_after_blank_line() {
        let req = ParsedRequest::parse(
            b"POST /example.com/form HTTP/1.0\r\nContent-Length: 3\r\n\r\na=1",
        )
        .unwrap();

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body.as_ref(), b"a=1");
        assert_eq!(req.header_lines, vec!["Content-Length: 3".to_string()]);
    }

    #[test]
    fn test_post_without_terminator_has_empty_body() {
        let req = ParsedRequest::parse(b"POST /example.com/form HTTP/1.0\r\nHost: x").unwrap();
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_body_only_extracted_for_post() {
        let req = ParsedRequest::parse(b"GET /example.com/ HTTP/1.0\r\n\r\ntrailing").unwrap();
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_post_body_keeps_binary_bytes() {
        let mut raw = b"POST /example.com/upload HTTP/1.0\r\n\r\n".to_vec();
        raw.extend_from_slice(&[0xff, 0x00, 0xfe]);

        let req = ParsedRequest::parse(&raw).unwrap();
        assert_eq!(req.body.as_ref(), &[0xff, 0x00, 0xfe]);
    }

    #[test]
    fn test_target_normalization() {
        let t = Target::from_request_target("/www.example.com/index.html");
        assert_eq!(t.hostname, "www.example.com");
        assert_eq!(t.path, "/index.html");
        assert_eq!(t.normalized, "www.example.com/index.html");

        let t = Target::from_request_target("http://www.example.com/a/b?c=d");
        assert_eq!(t.hostname, "www.example.com");
        assert_eq!(t.path, "/a/b?c=d");
        assert_eq!(t.normalized, "www.example.com/a/b?c=d");

        let t = Target::from_request_target("example.com/x");
        assert_eq!(t.hostname, "example.com");
        assert_eq!(t.path, "/x");
    }

    #[test]
    fn test_target_without_path_defaults_to_root() {
        for raw in ["/www.example.com", "http://www.example.com", "www.example.com"] {
            let t = Target::from_request_target(raw);
            assert_eq!(t.hostname, "www.example.com");
            assert_eq!(t.path, "/");
            assert_eq!(t.normalized, "www.example.com");
        }

        let t = Target::from_request_target("/example.com/");
        assert_eq!(t.hostname, "example.com");
        assert_eq!(t.path, "/");
    }

    #[test]
    fn test_parse_authority() {
        assert_eq!(
            parse_authority("example.com:8443").unwrap(),
            ("example.com".to_string(), 8443)
        );
        assert_eq!(
            parse_authority("example.com").unwrap(),
            ("example.com".to_string(), 443)
        );
        assert!(matches!(
            parse_authority("example.com:https").unwrap_err(),
            WaypostError::MalformedRequest(_)
        ));
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"ab\r\n\r\ncd", b"\r\n\r\n"), Some(2));
        assert_eq!(find_subsequence(b"abcd", b"\r\n\r\n"), None);
        assert_eq!(find_subsequence(b"", b"\r\n\r\n"), None);
    }
}
