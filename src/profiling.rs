//! Tracing subscriber setup
//!
//! Only built with the `profiling` feature. Library code logs through
//! `tracing` unconditionally; these helpers install a subscriber so the
//! spans around world creation, event drains, scheduler ticks and
//! propagation passes become visible.
//!
//! ```ignore
//! simcore::profiling::init_stdout("simcore=debug")?;
//!
//! let _guard = simcore::profiling::init_file("logs", "trace.json")?;
//! ```

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::error::{EcsError, Result};

/// Install a human-readable stdout subscriber.
///
/// `filter` uses `EnvFilter` directive syntax and is overridden by
/// `RUST_LOG` when that is set.
pub fn init_stdout(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| EcsError::ConfigError(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| EcsError::ConfigError(e.to_string()))
}

/// Write JSON trace lines to `dir/prefix` through a non-blocking writer.
///
/// Keep the returned guard alive; dropping it flushes and stops the writer.
pub fn init_file(dir: impl AsRef<Path>, prefix: &str) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(dir, prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .try_init()
        .map_err(|e| EcsError::ConfigError(e.to_string()))?;

    Ok(guard)
}
