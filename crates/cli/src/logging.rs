//! Tracing setup
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`). When the
//! config names a `log.dir`, a daily rolling file is written there too.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "franq-sync.log";

/// Install the global subscriber. The returned guard must outlive all logging.
pub fn init(config_path: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A broken config is reported by the command itself; logging falls back to stderr
    let log_dir = crate::util::load_config(config_path)
        .ok()
        .and_then(|config| config.log.dir);

    let mut file_error = None;
    let (file_layer, guard) = match log_dir.map(|dir| open_appender(&dir).map_err(|e| (dir, e))) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Some(Err(failure)) => {
            file_error = Some(failure);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some((dir, e)) = file_error {
        tracing::warn!(dir = %dir.display(), "Cannot open log directory, logging to stderr only: {}", e);
    }

    guard
}

fn open_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(dir)
}
