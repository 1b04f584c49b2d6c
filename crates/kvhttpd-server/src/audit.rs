//! Audit log
//!
//! One line per completed GET/PUT:
//!
//! ```text
//! METHOD,URI,STATUS_CODE,REQUEST_ID
//! ```
//!
//! Lines go to stderr by default. Each line is written with the sink locked,
//! so lines from concurrent workers never interleave. `KVHTTPD_FLUSH_AUDIT=1`
//! flushes after every line.

use std::io::{self, Write};
use std::sync::Arc;

use kvhttpd_core::env::{env_get_bool, keys};
use parking_lot::Mutex;

use crate::connection::{Method, Status};

/// Request id recorded when the client sent no `Request-Id` header
pub const DEFAULT_REQUEST_ID: &str = "0";

enum Sink {
    Stderr,
    Writer(Mutex<Box<dyn Write + Send>>),
}

/// Shared audit line writer
pub struct AuditLog {
    sink: Sink,
    flush: bool,
}

impl AuditLog {
    /// Log to the process's standard error
    pub fn stderr() -> Self {
        Self {
            sink: Sink::Stderr,
            flush: env_get_bool(keys::FLUSH_AUDIT, false),
        }
    }

    /// Log to an arbitrary writer (flushed after every line)
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Sink::Writer(Mutex::new(Box::new(writer))),
            flush: true,
        }
    }

    /// Record one completed request
    pub fn record(&self, method: &Method, uri: &str, status: Status, request_id: Option<&str>) {
        let id = request_id.unwrap_or(DEFAULT_REQUEST_ID);
        let result = match &self.sink {
            Sink::Stderr => {
                let mut handle = io::stderr().lock();
                write_line(&mut handle, method, uri, status, id, self.flush)
            }
            Sink::Writer(w) => {
                let mut w = w.lock();
                write_line(&mut *w, method, uri, status, id, self.flush)
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "audit log write failed");
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::stderr()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sink = match self.sink {
            Sink::Stderr => "stderr",
            Sink::Writer(_) => "writer",
        };
        f.debug_struct("AuditLog")
            .field("sink", &sink)
            .field("flush", &self.flush)
            .finish()
    }
}

fn write_line(
    w: &mut dyn Write,
    method: &Method,
    uri: &str,
    status: Status,
    id: &str,
    flush: bool,
) -> io::Result<()> {
    // Single write so the line lands whole even on an unlocked sink.
    let line = format!("{},{},{},{}\n", method, uri, status.code(), id);
    w.write_all(line.as_bytes())?;
    if flush {
        w.flush()?;
    }
    Ok(())
}

/// Cloneable in-memory sink, handy for capturing the audit stream
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Written lines, without terminators
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
