//! Server setup errors
//!
//! Only startup can fail fatally. Per-request failures are turned into a
//! status code by the handler and never surface here.

use std::net::SocketAddr;

use kvhttpd_core::CoreError;

/// Result type for server setup
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be created
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread could not be started
    #[error("failed to spawn worker thread {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected by `ServerConfig::validate`
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Core primitive construction failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Other I/O failure during setup
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ServerError::InvalidConfig("num_workers must be at least 1");
        assert_eq!(e.to_string(), "invalid configuration: num_workers must be at least 1");

        let e: ServerError = CoreError::InvalidCapacity.into();
        assert_eq!(e.to_string(), "queue capacity must be at least 1");
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error as _;
        let e = ServerError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(e.to_string().starts_with("cannot bind 127.0.0.1:1"));
        assert!(e.source().is_some());
    }
}
