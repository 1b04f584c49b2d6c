//! Diagnostic logging for the kvhttpd binary.
//!
//! The filter is the first of these that yields valid directives:
//! `KVHTTPD_LOG`, `RUST_LOG`, then the level chosen on the command line.
//! Diagnostics share stderr with the audit log, so the default level is
//! `warn`.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use kvhttpd_core::env::keys;

/// Crates whose events a debug run shows in full
const OWN_TARGETS: [&str; 3] = ["kvhttpd", "kvhttpd_server", "kvhttpd_core"];

/// Install the global subscriber. Call once, first thing in `main`.
pub fn init(level: Level) {
    let debug = level >= Level::DEBUG;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(pick_directives(
            std::env::var(keys::LOG).ok(),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
            level,
        )))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_thread_names(debug)
        .with_target(debug)
        .compact()
        .init();
}

/// First set of directives that parses; unparseable ones are skipped
fn pick_directives(own: Option<String>, rust_log: Option<String>, level: Level) -> String {
    [own, rust_log]
        .into_iter()
        .flatten()
        .find(|d| EnvFilter::try_new(d).is_ok())
        .unwrap_or_else(|| fallback_directives(level))
}

/// `warn` stays global; `debug` and `trace` apply to our crates only
fn fallback_directives(level: Level) -> String {
    if level >= Level::DEBUG {
        let own: Vec<String> = OWN_TARGETS.iter().map(|t| format!("{t}={level}")).collect();
        format!("warn,{}", own.join(","))
    } else {
        level.to_string()
    }
}
