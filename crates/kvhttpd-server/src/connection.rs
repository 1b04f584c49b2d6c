//! Connection abstraction consumed by the request handler
//!
//! The handler never touches bytes on the wire. It sees a parsed
//! [`Request`], answers with a [`Status`], and moves bodies between the
//! connection and open files. [`crate::http::HttpConnection`] is the
//! HTTP/1.1 implementation used by the server; tests substitute their own.

use std::fmt;
use std::fs::File;
use std::io;

/// Response status codes the server produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Created,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
    NotImplemented,
    VersionNotSupported,
}

impl Status {
    /// Numeric code
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Created => 201,
            Status::BadRequest => 400,
            Status::Forbidden => 403,
            Status::NotFound => 404,
            Status::InternalServerError => 500,
            Status::NotImplemented => 501,
            Status::VersionNotSupported => 505,
        }
    }

    /// Reason phrase
    pub const fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::BadRequest => "Bad Request",
            Status::Forbidden => "Forbidden",
            Status::NotFound => "Not Found",
            Status::InternalServerError => "Internal Server Error",
            Status::NotImplemented => "Not Implemented",
            Status::VersionNotSupported => "Version Not Supported",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

/// Request method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    /// Syntactically valid but unsupported (DELETE, HEAD, ...)
    Other(String),
}

impl Method {
    /// Classify a method token
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            other => Method::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Other(m) => m,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Request target as received, starting with `/`
    pub uri: String,
    /// Header fields in arrival order
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Declared body length, if present and numeric
    pub fn content_length(&self) -> Option<u64> {
        self.header("Content-Length").and_then(|v| v.trim().parse().ok())
    }
}

/// One accepted client connection
///
/// Every request gets exactly one call to `send_response` or `send_file`.
pub trait Connection {
    /// Read and parse the request head
    ///
    /// A malformed request yields the status to answer it with.
    fn parse(&mut self) -> Result<Request, Status>;

    /// Send a status-only response
    fn send_response(&mut self, status: Status) -> io::Result<()>;

    /// Send `200 OK` with exactly `length` bytes read from `file`
    fn send_file(&mut self, file: &mut File, length: u64) -> io::Result<()>;

    /// Copy the request body into `file`, returning the byte count
    ///
    /// Fails with `UnexpectedEof` if the peer sends less than it declared.
    fn receive_body_into(&mut self, file: &mut File) -> io::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::Created.code(), 201);
        assert_eq!(Status::Forbidden.code(), 403);
        assert_eq!(Status::NotFound.code(), 404);
        assert_eq!(Status::InternalServerError.code(), 500);
        assert_eq!(Status::NotImplemented.code(), 501);
        assert_eq!(Status::NotFound.to_string(), "404 Not Found");
    }

    #[test]
    fn test_method_tokens() {
        assert_eq!(Method::from_token("GET"), Method::Get);
        assert_eq!(Method::from_token("PUT"), Method::Put);
        assert_eq!(Method::from_token("DELETE"), Method::Other("DELETE".into()));
        // Methods are case-sensitive.
        assert_eq!(Method::from_token("get"), Method::Other("get".into()));
        assert_eq!(Method::Other("HEAD".into()).to_string(), "HEAD");
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = Request::new(Method::Get, "/a.txt")
            .with_header("request-id", "17")
            .with_header("Content-Length", " 5 ");
        assert_eq!(req.header("Request-Id"), Some("17"));
        assert_eq!(req.header("REQUEST-ID"), Some("17"));
        assert_eq!(req.header("Missing"), None);
        assert_eq!(req.content_length(), Some(5));
    }
}
