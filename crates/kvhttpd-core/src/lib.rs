//! # kvhttpd-core
//!
//! Core concurrency primitives for the kvhttpd object server.
//!
//! This crate is I/O-free. It knows nothing about sockets, HTTP or the
//! filesystem; `kvhttpd-server` builds the request pipeline on top of it.
//!
//! ## Modules
//!
//! - `queue` - Bounded blocking FIFO used to hand connections to workers
//! - `rwlock` - Per-resource fair reader-writer lock
//! - `lock_table` - URI -> resource lock map with get-or-create semantics
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod queue;
pub mod rwlock;
pub mod lock_table;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use queue::JobQueue;
pub use rwlock::{LockSnapshot, ReaderGuard, ResourceLock, WriterGuard};
pub use lock_table::LockTable;
pub use error::{CoreError, CoreResult};
pub use env::{env_get_bool, env_get_opt};

/// Tunables shared by the server and the binary
pub mod constants {
    /// Worker threads when none (or fewer than one) are requested
    pub const DEFAULT_WORKERS: usize = 4;

    /// Consecutive readers that may share one resource lock
    pub const DEFAULT_READER_BATCH: usize = 1;

    /// Initial bucket count for the lock table
    pub const LOCK_TABLE_INITIAL_CAPACITY: usize = 100;
}
