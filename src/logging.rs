//! Logging initialisation for dockhand.
//!
//! Everything goes to stderr, filtered by `RUST_LOG` when set. Without it
//! only dockhand's own events are shown: `warn` and above, or `info` with
//! `--verbose`. Setting `DOCKHAND_LOG=1` adds `dockhand.log` in the log
//! directory, which always records at `debug` so every dispatched command
//! ends up in the file.
//!
//! `main` wraps the whole run in a `dockhand` span carrying the machine
//! name, so each line names the VM it concerns.

use std::path::PathBuf;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Set to `1` to enable the log file.
pub const LOG_ENV_VAR: &str = "DOCKHAND_LOG";

pub const LOG_FILE_NAME: &str = "dockhand.log";

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Directive applied to stderr when `RUST_LOG` is unset.
fn stderr_directive(verbose: bool) -> String {
    let level = if verbose { Level::INFO } else { Level::WARN };
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.as_str().to_lowercase())
}

fn stderr_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(stderr_directive(verbose)))
}

fn file_logging_enabled() -> bool {
    std::env::var(LOG_ENV_VAR).as_deref() == Ok("1")
}

/// Initialise the global tracing subscriber.
///
/// Call once from `main` and hold the returned guard until exit.
pub fn init(log_dir: Option<PathBuf>, verbose: bool) -> LogGuard {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter(verbose));

    let (file_layer, file_guard) = if file_logging_enabled() {
        let dir = log_dir.unwrap_or_else(std::env::temp_dir);
        let _ = std::fs::create_dir_all(&dir);
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE_NAME));

        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(LevelFilter::DEBUG);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    LogGuard { _file_guard: file_guard }
}
