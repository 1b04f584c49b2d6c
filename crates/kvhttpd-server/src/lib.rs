//! # kvhttpd-server
//!
//! Multi-threaded HTTP/1.1 server that exposes a directory as a key-value
//! store: `GET /key` reads a file, `PUT /key` atomically replaces it.
//!
//! This crate provides:
//! - The accept loop and worker pool
//! - GET/PUT handlers serialized per URI by `kvhttpd-core` locks
//! - A minimal HTTP/1.1 connection layer
//! - The request audit log
//!
//! ```no_run
//! use kvhttpd_server::{Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::new().port(8080).num_workers(8))?;
//! server.run()?;
//! # Ok::<(), kvhttpd_server::ServerError>(())
//! ```

pub mod audit;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod http;
pub mod server;
pub mod worker;

// Re-exports
pub use audit::{AuditLog, SharedBuffer};
pub use config::ServerConfig;
pub use connection::{Connection, Method, Request, Status};
pub use error::{ServerError, ServerResult};
pub use handler::Handler;
pub use http::HttpConnection;
pub use server::{Job, Server, ServerHandle};
pub use worker::WorkerPool;
