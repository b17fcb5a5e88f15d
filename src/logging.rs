use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Set up tracing with a human-readable console layer and a daily-rolling
/// JSON file under `logs/`. The returned guard flushes the file writer on
/// drop; hold it for the lifetime of the process.
pub fn init_logging() -> WorkerGuard {
    init_logging_to(Path::new("logs"))
}

pub fn init_logging_to(log_dir: &Path) -> WorkerGuard {
    let _ = fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "enrich.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::from_default_env()
        .add_directive("registry_enrich=info".parse().expect("valid directive"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();

    guard
}
