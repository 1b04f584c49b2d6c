//! Listener, dispatcher and lifecycle
//!
//! [`Server::run`] accepts connections on the calling thread and pushes each
//! one onto the bounded job queue, blocking while every slot is taken. The
//! worker pool drains the queue. [`ServerHandle::shutdown`] stops the accept
//! loop, lets queued connections finish, and joins the workers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kvhttpd_core::{JobQueue, LockTable};
use parking_lot::Mutex;

use crate::audit::AuditLog;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::Handler;
use crate::http::HttpConnection;
use crate::worker::WorkerPool;

/// One accepted connection waiting for a worker
#[derive(Debug)]
pub struct Job {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

struct Inner {
    queue: Arc<JobQueue<Job>>,
    stopped: AtomicBool,
    workers: Mutex<Option<WorkerPool>>,
    local_addr: SocketAddr,
}

/// A bound server with its workers running
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    handler: Arc<Handler>,
    inner: Arc<Inner>,
}

impl Server {
    /// Bind and start workers, auditing to stderr
    pub fn bind(config: ServerConfig) -> ServerResult<Self> {
        Self::bind_with_audit(config, AuditLog::stderr())
    }

    /// Bind and start workers with a custom audit sink
    pub fn bind_with_audit(config: ServerConfig, audit: AuditLog) -> ServerResult<Self> {
        config.validate()?;

        let addr = config.socket_addr();
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let queue = Arc::new(JobQueue::new(config.effective_queue_capacity())?);
        let locks = LockTable::new(config.reader_batch)?;
        let handler = Arc::new(Handler::new(config.root.clone(), locks, audit));

        let mut pool = WorkerPool::new(config.num_workers);
        let handler_w = Arc::clone(&handler);
        let max_header_bytes = config.max_header_bytes;
        pool.start(Arc::clone(&queue), move |job: Job| {
            let _span = tracing::debug_span!("conn", peer = %job.peer).entered();
            let mut conn = HttpConnection::new(job.stream, max_header_bytes);
            handler_w.handle(&mut conn);
        })?;

        tracing::info!(
            addr = %local_addr,
            workers = config.num_workers,
            queue = config.effective_queue_capacity(),
            reader_batch = config.reader_batch,
            root = %config.root.display(),
            "listening"
        );

        Ok(Self {
            config,
            listener,
            handler,
            inner: Arc::new(Inner {
                queue,
                stopped: AtomicBool::new(false),
                workers: Mutex::new(Some(pool)),
                local_addr,
            }),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shared request handler
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// Handle for stopping the server from another thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Accept connections until shut down
    pub fn run(&self) -> ServerResult<()> {
        loop {
            let accepted = self.listener.accept();
            if self.inner.stopped.load(Ordering::Acquire) {
                break;
            }
            match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "accepted");
                    if self.inner.queue.push(Job { stream, peer }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            }
        }
        tracing::info!("accept loop stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.inner.local_addr)
            .field("config", &self.config)
            .finish()
    }
}

/// Cloneable stop switch for a [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

impl ServerHandle {
    /// Stop accepting, finish queued connections, join the workers
    ///
    /// Only the first call does anything.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.queue.close();

        // Wake a blocked accept(); the loop sees `stopped` and exits.
        let _ = TcpStream::connect(wake_addr(self.inner.local_addr));

        if let Some(pool) = self.inner.workers.lock().take() {
            pool.join();
        }
        tracing::info!("server stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.inner.local_addr)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Loopback equivalent of a wildcard bind address
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}
