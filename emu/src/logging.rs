//! Tracing setup shared by every host embedding the core.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{EmulatorConfig, LogTarget};
use crate::error::InitError;

/// Installs the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` wins over `config.log_filter`. When logging to a file the
/// returned guard flushes the background writer on drop, so keep it alive
/// for the whole session.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init(config: &EmulatorConfig) -> Result<Option<WorkerGuard>, InitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    match &config.log_target {
        LogTarget::Stdout => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .try_init()
                .map_err(|e| InitError::Logging(e.to_string()))?;

            Ok(None)
        }
        LogTarget::File(path) => {
            let directory = path
                .parent()
                .map_or_else(|| std::path::PathBuf::from("."), std::path::Path::to_path_buf);
            let file_name = path
                .file_name()
                .map_or_else(|| "armulator.log".into(), std::ffi::OsStr::to_os_string);

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .map_err(|e| InitError::Logging(e.to_string()))?;

            Ok(Some(guard))
        }
    }
}
