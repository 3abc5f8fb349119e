//! Subscriber setup: a console layer on stderr plus an append-only file.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `console` and `file` are default directives for each layer; `RUST_LOG`
/// overrides the console one. Keep the returned guard alive for the life of
/// the process or buffered file lines are lost on exit.
pub fn init(log_file: &Path, console: &str, file: &str) -> Result<WorkerGuard> {
    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = log_file
        .file_name()
        .with_context(|| format!("Log file path {:?} has no file name", log_file))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {:?}", dir))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy().into_owned())
        .build(dir)
        .with_context(|| format!("Failed to open log file {:?}", log_file))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_filter(EnvFilter::new(file)),
        )
        .init();

    Ok(guard)
}
