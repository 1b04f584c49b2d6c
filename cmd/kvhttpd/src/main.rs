//! # kvhttpd
//!
//! Serve a directory as a key-value store over HTTP/1.1.
//!
//! ## Usage
//!
//!     kvhttpd [-t <threads>] [-d <root>] [-n <reader-batch>] [-v|-q] <port>
//!
//! Settings come from `KVHTTPD_*` environment variables first; flags given
//! on the command line override them.
//!
//! ## Try it
//!
//!     kvhttpd -t 8 8080 &
//!     curl -T notes.txt http://127.0.0.1:8080/notes.txt
//!     curl -H 'Request-Id: 42' http://127.0.0.1:8080/notes.txt

mod tracing_setup;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};

use kvhttpd_server::{Server, ServerConfig};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "kvhttpd", version, about = "Filesystem-backed key-value HTTP server")]
struct Cli {
    /// Worker threads (values below 1 mean 4)
    #[arg(short = 't', long = "threads", allow_negative_numbers = true)]
    threads: Option<i64>,

    /// Directory objects are stored in
    #[arg(short = 'd', long = "root")]
    root: Option<PathBuf>,

    /// Consecutive readers allowed to share a URI at once
    #[arg(short = 'n', long = "reader-batch")]
    reader_batch: Option<usize>,

    /// Debug-level diagnostics
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,

    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

impl Cli {
    /// Diagnostic level when neither `KVHTTPD_LOG` nor `RUST_LOG` is set
    fn log_level(&self) -> Level {
        match (self.verbose, self.quiet) {
            (true, _) => Level::DEBUG,
            (_, true) => Level::ERROR,
            _ => Level::WARN,
        }
    }

    /// Layer command-line flags over `config`
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        config = config.port(self.port);
        if let Some(n) = self.threads {
            config = config.num_workers(n);
        }
        if let Some(root) = &self.root {
            config = config.root(root.clone());
        }
        if let Some(n) = self.reader_batch {
            config = config.reader_batch(n);
        }
        config
    }
}

fn ignore_sigpipe() -> anyhow::Result<()> {
    // SAFETY: SIG_IGN installs no Rust code as a handler.
    unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .context("cannot ignore SIGPIPE")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(cli.log_level());
    ignore_sigpipe()?;

    let config = cli.apply(ServerConfig::from_env());
    tracing::debug!(?config, "effective configuration");

    let server = Server::bind(config).context("failed to start kvhttpd")?;
    server.run().context("accept loop failed")?;
    Ok(())
}
