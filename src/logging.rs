// 📜 Logging - console plus optional process log file

use crate::error::{ReconcileError, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILE: &str = "price_analysis.log";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "price_reconciliation=debug"
    } else {
        "price_reconciliation=info"
    }
}

/// RUST_LOG wins when set; otherwise info, or debug with `verbose`
pub fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop, so the caller keeps it
/// alive until the run is over.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            fs::create_dir_all(dir).map_err(|e| ReconcileError::file_access(dir, e))?;

            let file_name = path
                .file_name()
                .ok_or_else(|| ReconcileError::Config(format!("invalid log file path: {}", path.display())))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ReconcileError::Config(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "price_reconciliation=info");
        assert_eq!(default_directive(true), "price_reconciliation=debug");
    }

    #[test]
    fn test_log_file_without_name_is_rejected() {
        let result = init_logging(false, Some(Path::new("/")));
        assert!(matches!(result, Err(ReconcileError::Config(_))));
    }
}
