//! Request handler: GET / PUT over the filesystem
//!
//! Every GET runs under the URI's reader lock and every PUT's rename under
//! its writer lock. Lock lookups go through the [`LockTable`], whose mutex is
//! released before the resource lock is awaited.
//!
//! A PUT receives its body into a temporary file next to the target *before*
//! taking any lock, then renames it into place. Readers therefore see either
//! the old object or the new one in full, and a slow upload never blocks them.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use kvhttpd_core::LockTable;
use nix::errno::Errno;
use tempfile::NamedTempFile;

use crate::audit::AuditLog;
use crate::connection::{Connection, Method, Request, Status};

/// Prefix of in-flight upload files
pub const TEMP_PREFIX: &str = ".kvhttpd-upload-";

/// State shared by every worker
pub struct Handler {
    root: PathBuf,
    locks: LockTable,
    audit: AuditLog,
}

impl Handler {
    pub fn new(root: impl Into<PathBuf>, locks: LockTable, audit: AuditLog) -> Self {
        Self {
            root: root.into(),
            locks,
            audit,
        }
    }

    /// The lock table (exposed for diagnostics and tests)
    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    /// Filesystem path backing `uri`
    pub fn resolve(&self, uri: &str) -> PathBuf {
        self.root.join(uri.trim_start_matches('/'))
    }

    /// Serve one connection start to finish
    pub fn handle<C: Connection>(&self, conn: &mut C) {
        let request = match conn.parse() {
            Ok(r) => r,
            Err(status) => {
                tracing::debug!(%status, "rejecting malformed request");
                reply(conn, status);
                return;
            }
        };

        tracing::debug!(method = %request.method, uri = %request.uri, "request");
        match request.method {
            Method::Get => self.handle_get(conn, &request),
            Method::Put => self.handle_put(conn, &request),
            Method::Other(_) => handle_unsupported(conn, &request),
        }
    }

    fn handle_get<C: Connection>(&self, conn: &mut C, req: &Request) {
        let path = self.resolve(&req.uri);
        let lock = self.locks.get_or_create(&req.uri);
        let guard = lock.reader_lock();

        let status = match File::open(&path) {
            Err(e) => {
                let status = classify(&e);
                tracing::debug!(path = %path.display(), error = %e, %status, "open failed");
                reply(conn, status);
                status
            }
            Ok(mut file) => match file.metadata() {
                Ok(meta) if meta.is_dir() => {
                    reply(conn, Status::Forbidden);
                    Status::Forbidden
                }
                Ok(meta) => {
                    if let Err(e) = conn.send_file(&mut file, meta.len()) {
                        tracing::warn!(uri = %req.uri, error = %e, "sending body failed");
                    }
                    Status::Ok
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "stat failed");
                    reply(conn, Status::InternalServerError);
                    Status::InternalServerError
                }
            },
        };

        // Logged while still holding the lock: audit order is lock order.
        self.audit
            .record(&req.method, &req.uri, status, req.header("Request-Id"));
        guard.unlock();
    }

    fn handle_put<C: Connection>(&self, conn: &mut C, req: &Request) {
        let path = self.resolve(&req.uri);

        let mut upload = match self.create_upload(&path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot create upload file");
                self.finish_unlocked(conn, req, Status::InternalServerError);
                return;
            }
        };

        if let Err(e) = conn.receive_body_into(upload.as_file_mut()) {
            let status = match e.kind() {
                io::ErrorKind::UnexpectedEof => Status::BadRequest,
                _ => Status::InternalServerError,
            };
            tracing::debug!(uri = %req.uri, error = %e, "receiving body failed");
            self.finish_unlocked(conn, req, status);
            return;
        }

        let lock = self.locks.get_or_create(&req.uri);
        let guard = lock.writer_lock();

        let status = match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => Status::Forbidden,
            probe => {
                let existed = probe.is_ok();
                match upload.persist(&path) {
                    Ok(_) if existed => Status::Ok,
                    Ok(_) => Status::Created,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e.error, "rename failed");
                        classify(&e.error)
                    }
                }
            }
        };

        reply(conn, status);
        self.audit
            .record(&req.method, &req.uri, status, req.header("Request-Id"));
        guard.unlock();
    }

    /// Temp file in the target's directory, so the final rename stays on
    /// one filesystem
    fn create_upload(&self, path: &Path) -> io::Result<NamedTempFile> {
        let dir = path.parent().unwrap_or(&self.root);
        tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)
    }

    fn finish_unlocked<C: Connection>(&self, conn: &mut C, req: &Request, status: Status) {
        reply(conn, status);
        self.audit
            .record(&req.method, &req.uri, status, req.header("Request-Id"));
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("root", &self.root)
            .field("locks", &self.locks)
            .finish()
    }
}

fn handle_unsupported<C: Connection>(conn: &mut C, req: &Request) {
    tracing::debug!(method = %req.method, uri = %req.uri, "method not implemented");
    reply(conn, Status::NotImplemented);
}

fn reply<C: Connection>(conn: &mut C, status: Status) {
    if let Err(e) = conn.send_response(status) {
        tracing::debug!(%status, error = %e, "client went away before response");
    }
}

/// Map a filesystem error to the status reported to the client
pub fn classify(e: &io::Error) -> Status {
    match e.raw_os_error().map(Errno::from_raw) {
        Some(Errno::EACCES | Errno::EPERM) => Status::Forbidden,
        Some(Errno::ENOENT) => Status::NotFound,
        Some(_) => Status::InternalServerError,
        None => match e.kind() {
            io::ErrorKind::PermissionDenied => Status::Forbidden,
            io::ErrorKind::NotFound => Status::NotFound,
            _ => Status::InternalServerError,
        },
    }
}
