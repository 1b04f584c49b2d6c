//! HTTP/1.1 implementation of [`Connection`]
//!
//! Minimal by intent: one request per connection, `Content-Length` bodies
//! only, no chunked encoding and no keep-alive.
//!
//! Request grammar accepted:
//!
//! ```text
//! METHOD SP /uri SP HTTP/1.1 CRLF
//! (Key: value CRLF)*
//! CRLF
//! [body]
//! ```

use std::fs::File;
use std::io::{self, Read, Write};

use crate::connection::{Connection, Method, Request, Status};

/// Longest accepted request target
pub const MAX_URI_BYTES: usize = 64;

const MAX_METHOD_BYTES: usize = 8;
const MAX_HEADER_KEY_BYTES: usize = 128;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 1024;

/// HTTP/1.1 connection over any byte stream
pub struct HttpConnection<S> {
    stream: S,
    max_header_bytes: usize,
    /// Body bytes that arrived together with the head
    leftover: Vec<u8>,
    content_length: Option<u64>,
}

impl<S: Read + Write> HttpConnection<S> {
    pub fn new(stream: S, max_header_bytes: usize) -> Self {
        Self {
            stream,
            max_header_bytes,
            leftover: Vec::new(),
            content_length: None,
        }
    }

    /// Give back the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read until the blank line that ends the head
    fn read_head(&mut self) -> Result<Vec<u8>, Status> {
        let mut buf = Vec::with_capacity(self.max_header_bytes);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = find_terminator(&buf) {
                self.leftover = buf.split_off(end + HEAD_TERMINATOR.len());
                buf.truncate(end);
                return Ok(buf);
            }
            let room = self.max_header_bytes.saturating_sub(buf.len());
            if room == 0 {
                return Err(Status::BadRequest);
            }
            let want = room.min(READ_CHUNK);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => return Err(Status::BadRequest),
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(Status::BadRequest),
            }
        }
    }

    fn write_head(&mut self, status: Status, length: u64) -> io::Result<()> {
        write!(
            self.stream,
            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n\r\n",
            status.code(),
            status.reason(),
            length
        )
    }
}

impl<S: Read + Write> Connection for HttpConnection<S> {
    fn parse(&mut self) -> Result<Request, Status> {
        let head = self.read_head()?;
        let request = parse_head(&head)?;

        if request.method == Method::Put {
            match request.header("Content-Length") {
                Some(v) => match v.trim().parse::<u64>() {
                    Ok(n) => self.content_length = Some(n),
                    Err(_) => return Err(Status::BadRequest),
                },
                None => return Err(Status::BadRequest),
            }
        }
        Ok(request)
    }

    fn send_response(&mut self, status: Status) -> io::Result<()> {
        let body = format!("{}\n", status.reason());
        self.write_head(status, body.len() as u64)?;
        self.stream.write_all(body.as_bytes())?;
        self.stream.flush()
    }

    fn send_file(&mut self, file: &mut File, length: u64) -> io::Result<()> {
        self.write_head(Status::Ok, length)?;
        let copied = io::copy(&mut file.take(length), &mut self.stream)?;
        if copied != length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file ended after {copied} of {length} bytes"),
            ));
        }
        self.stream.flush()
    }

    fn receive_body_into(&mut self, file: &mut File) -> io::Result<u64> {
        let length = self.content_length.unwrap_or(0);

        let early = self.leftover.len().min(usize::try_from(length).unwrap_or(usize::MAX));
        file.write_all(&self.leftover[..early])?;
        self.leftover.clear();

        let remaining = length - early as u64;
        let copied = io::copy(&mut (&mut self.stream).take(remaining), file)?;
        if copied != remaining {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended after {} of {length} bytes", early as u64 + copied),
            ));
        }
        Ok(length)
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}

fn parse_head(head: &[u8]) -> Result<Request, Status> {
    let text = std::str::from_utf8(head).map_err(|_| Status::BadRequest)?;
    let mut lines = text.split("\r\n");

    let request_line = lines.next().ok_or(Status::BadRequest)?;
    let mut parts = request_line.split(' ');
    let (method, uri, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(u), Some(v), None) => (m, u, v),
        _ => return Err(Status::BadRequest),
    };

    if !valid_method(method) || !valid_uri(uri) || !valid_version(version) {
        return Err(Status::BadRequest);
    }
    if version != "HTTP/1.1" {
        return Err(Status::VersionNotSupported);
    }

    let mut request = Request::new(Method::from_token(method), uri);
    for line in lines {
        let (key, value) = line.split_once(':').ok_or(Status::BadRequest)?;
        if !valid_header_key(key) {
            return Err(Status::BadRequest);
        }
        request.headers.push((key.to_owned(), value.trim().to_owned()));
    }
    Ok(request)
}

fn valid_method(m: &str) -> bool {
    (1..=MAX_METHOD_BYTES).contains(&m.len()) && m.bytes().all(|b| b.is_ascii_alphabetic())
}

/// `/seg[/seg]*` with segments of `[A-Za-z0-9._-]`, never `.` or `..`
pub fn valid_uri(uri: &str) -> bool {
    let Some(path) = uri.strip_prefix('/') else {
        return false;
    };
    if uri.len() > MAX_URI_BYTES || path.is_empty() {
        return false;
    }
    path.split('/').all(|seg| {
        !seg.is_empty()
            && seg != "."
            && seg != ".."
            && seg
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    })
}

fn valid_version(v: &str) -> bool {
    match v.strip_prefix("HTTP/").map(str::as_bytes) {
        Some([major, b'.', minor]) => major.is_ascii_digit() && minor.is_ascii_digit(),
        _ => false,
    }
}

fn valid_header_key(k: &str) -> bool {
    (1..=MAX_HEADER_KEY_BYTES).contains(&k.len())
        && k.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_'))
}

/// In-memory stream: reads from a script, records what is written
#[cfg(test)]
pub(crate) struct MockStream {
    input: io::Cursor<Vec<u8>>,
    pub(crate) output: Vec<u8>,
}

#[cfg(test)]
impl MockStream {
    pub(crate) fn new(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: io::Cursor::new(input.into()),
            output: Vec::new(),
        }
    }

    pub(crate) fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[cfg(test)]
impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Trickle a few bytes at a time to exercise partial reads.
        let n = buf.len().min(7);
        self.input.read(&mut buf[..n])
    }
}

#[cfg(test)]
impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn conn(input: &str) -> HttpConnection<MockStream> {
        HttpConnection::new(MockStream::new(input), 2048)
    }

    #[test]
    fn test_parse_get() {
        let mut c = conn("GET /a.txt HTTP/1.1\r\nHost: x\r\nRequest-Id: 42\r\n\r\n");
        let req = c.parse().unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.uri, "/a.txt");
        assert_eq!(req.header("request-id"), Some("42"));
        assert_eq!(req.header("Host"), Some("x"));
    }

    #[test]
    fn test_parse_unsupported_method_is_not_malformed() {
        let mut c = conn("DELETE /a.txt HTTP/1.1\r\n\r\n");
        let req = c.parse().unwrap();
        assert_eq!(req.method, Method::Other("DELETE".into()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in [
            "GET /a.txt\r\n\r\n",
            "GET  /a.txt HTTP/1.1\r\n\r\n",
            "GET a.txt HTTP/1.1\r\n\r\n",
            "GET /../etc/passwd HTTP/1.1\r\n\r\n",
            "G3T /a.txt HTTP/1.1\r\n\r\n",
            "GET /a.txt HTTP/one\r\n\r\n",
            "GET /a.txt HTTP/1.1\r\nno-colon\r\n\r\n",
            "GET /a.txt HTTP/1.1\r\n",
        ] {
            assert_eq!(conn(raw).parse().unwrap_err(), Status::BadRequest, "{raw:?}");
        }
    }

    #[test]
    fn test_parse_wrong_version() {
        let mut c = conn("GET /a.txt HTTP/1.0\r\n\r\n");
        assert_eq!(c.parse().unwrap_err(), Status::VersionNotSupported);
    }

    #[test]
    fn test_head_too_large() {
        let raw = format!("GET /a HTTP/1.1\r\nX: {}\r\n\r\n", "y".repeat(4000));
        assert_eq!(conn(&raw).parse().unwrap_err(), Status::BadRequest);
    }

    #[test]
    fn test_put_requires_content_length() {
        assert_eq!(conn("PUT /a HTTP/1.1\r\n\r\n").parse().unwrap_err(), Status::BadRequest);
        assert_eq!(
            conn("PUT /a HTTP/1.1\r\nContent-Length: -1\r\n\r\n").parse().unwrap_err(),
            Status::BadRequest
        );
    }

    #[test]
    fn test_uri_validation() {
        assert!(valid_uri("/a.txt"));
        assert!(valid_uri("/dir/sub-dir/file_1.bin"));
        assert!(!valid_uri("/"));
        assert!(!valid_uri("/a//b"));
        assert!(!valid_uri("/a/"));
        assert!(!valid_uri("/./a"));
        assert!(!valid_uri("/a/.."));
        assert!(!valid_uri("/a b"));
        assert!(!valid_uri(&format!("/{}", "x".repeat(MAX_URI_BYTES))));
    }

    #[test]
    fn test_receive_body_spanning_head_read() {
        let mut c = conn("PUT /a.txt HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world");
        c.parse().unwrap();

        let mut file = tempfile::tempfile().unwrap();
        assert_eq!(c.receive_body_into(&mut file).unwrap(), 11);

        let mut body = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello world");
    }

    #[test]
    fn test_receive_short_body() {
        let mut c = conn("PUT /a.txt HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort");
        c.parse().unwrap();
        let mut file = tempfile::tempfile().unwrap();
        let err = c.receive_body_into(&mut file).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_send_response_format() {
        let mut c = conn("");
        c.send_response(Status::NotFound).unwrap();
        assert_eq!(
            c.into_inner().output_str(),
            "HTTP/1.1 404 Not Found\r\nContent-Length: 10\r\n\r\nNot Found\n"
        );
    }

    #[test]
    fn test_send_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"hello").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut c = conn("");
        c.send_file(&mut file, 5).unwrap();
        assert_eq!(
            c.into_inner().output_str(),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"
        );
    }
}
