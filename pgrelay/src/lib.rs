//! pgrelay: PostgreSQL connection pooler with read/write routing and sharding.

pub mod auth;
pub mod backend;
pub mod cli;
pub mod config;
pub mod frontend;
pub mod net;
pub mod sighup;

use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::LogFormat;

/// Setup the logger, so `info!`, `debug!`
/// and other macros actually output something.
///
/// Using try_init and ignoring errors to allow
/// for tests to call this multiple times.
pub fn logger(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let result = match format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr)
                .with_file(false);
            tracing_subscriber::registry()
                .with(layer)
                .with(filter)
                .try_init()
        }

        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(layer)
                .with(filter)
                .try_init()
        }
    };

    let _ = result;
}
