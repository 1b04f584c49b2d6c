//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use kvhttpd_core::constants::{DEFAULT_READER_BATCH, DEFAULT_WORKERS};
use kvhttpd_core::env::{env_get_opt, keys};

use crate::error::{ServerError, ServerResult};

/// Largest request head (request line plus headers) accepted
pub const DEFAULT_MAX_HEADER_BYTES: usize = 2048;

/// Configuration for the server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (default: all interfaces)
    pub bind_addr: IpAddr,

    /// TCP port; 0 picks an ephemeral port
    pub port: u16,

    /// Number of worker threads
    pub num_workers: usize,

    /// Job queue slots; `None` means one per worker
    pub queue_capacity: Option<usize>,

    /// Consecutive readers allowed to share one URI's lock
    pub reader_batch: usize,

    /// Directory URIs are resolved against
    pub root: PathBuf,

    /// Request head size limit
    pub max_header_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            num_workers: DEFAULT_WORKERS,
            queue_capacity: None,
            reader_batch: DEFAULT_READER_BATCH,
            root: PathBuf::from("."),
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `KVHTTPD_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_get_opt::<i64>(keys::THREADS) {
            config = config.num_workers(n);
        }
        if let Some(n) = env_get_opt::<usize>(keys::QUEUE_CAPACITY) {
            config.queue_capacity = Some(n);
        }
        if let Some(n) = env_get_opt::<usize>(keys::READER_BATCH) {
            config.reader_batch = n;
        }
        if let Some(root) = env_get_opt::<PathBuf>(keys::ROOT) {
            config.root = root;
        }
        config
    }

    /// Set the listen address
    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set number of worker threads
    ///
    /// Anything below one falls back to the default of four.
    pub fn num_workers(mut self, n: i64) -> Self {
        self.num_workers = if n < 1 {
            DEFAULT_WORKERS
        } else {
            usize::try_from(n).unwrap_or(DEFAULT_WORKERS)
        };
        self
    }

    /// Set job queue capacity explicitly
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = Some(n);
        self
    }

    /// Set the reader batch bound
    pub fn reader_batch(mut self, n: usize) -> Self {
        self.reader_batch = n;
        self
    }

    /// Set the object root directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the request head size limit
    pub fn max_header_bytes(mut self, n: usize) -> Self {
        self.max_header_bytes = n;
        self
    }

    /// Queue slots actually used
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.num_workers)
    }

    /// Socket address to bind
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> ServerResult<()> {
        if self.num_workers == 0 {
            return Err(ServerError::InvalidConfig("num_workers must be at least 1"));
        }
        if self.effective_queue_capacity() == 0 {
            return Err(ServerError::InvalidConfig("queue_capacity must be at least 1"));
        }
        if self.reader_batch == 0 {
            return Err(ServerError::InvalidConfig("reader_batch must be at least 1"));
        }
        if self.max_header_bytes < 16 {
            return Err(ServerError::InvalidConfig("max_header_bytes is too small"));
        }
        if !self.root.is_dir() {
            return Err(ServerError::InvalidConfig("root must be an existing directory"));
        }
        Ok(())
    }
}
