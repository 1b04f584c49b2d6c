//! Environment variable utilities
//!
//! The server reads its defaults from `KVHTTPD_*` variables before applying
//! command-line flags. Everything here is lenient: an unset or unparseable
//! variable is treated as absent.
//!
//! ```
//! use kvhttpd_core::env::{env_get_bool, env_get_opt, keys};
//!
//! let workers: usize = env_get_opt(keys::THREADS).unwrap_or(4);
//! let flush = env_get_bool(keys::FLUSH_AUDIT, false);
//! ```

use std::str::FromStr;

/// Variable names understood by kvhttpd
pub mod keys {
    /// Worker thread count
    pub const THREADS: &str = "KVHTTPD_THREADS";
    /// Job queue capacity (defaults to the worker count)
    pub const QUEUE_CAPACITY: &str = "KVHTTPD_QUEUE_CAPACITY";
    /// Resource lock reader batch bound
    pub const READER_BATCH: &str = "KVHTTPD_READER_BATCH";
    /// Directory URIs are resolved against
    pub const ROOT: &str = "KVHTTPD_ROOT";
    /// Flush stderr after every audit line
    pub const FLUSH_AUDIT: &str = "KVHTTPD_FLUSH_AUDIT";
    /// Tracing filter directives
    pub const LOG: &str = "KVHTTPD_LOG";
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (any case) are true; any other value is false.
/// An unset variable returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
