//! Unified tracing configuration for WordSuggest
//!
//! Provides structured logging with session correlation,
//! dual output to stderr (colored) and file (plain),
//! non-blocking file writes, and dynamic log level changes.

use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use anyhow::Context;
use tracing::Level;
use tracing_appender::{
    non_blocking::{NonBlockingBuilder, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Global guard to keep the non-blocking writer alive
static WORKER_GUARD: OnceCell<Mutex<Option<WorkerGuard>>> = OnceCell::new();

/// Current file log level (modified at runtime via atomic)
static FILE_LOG_LEVEL: AtomicU8 = AtomicU8::new(3);

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 1,
        Level::WARN => 2,
        Level::INFO => 3,
        Level::DEBUG => 4,
        Level::TRACE => 5,
    }
}

/// Set the file log level dynamically at runtime.
pub fn set_file_log_level(level: Level) {
    FILE_LOG_LEVEL.store(level_to_u8(level), Ordering::Relaxed);
    tracing::info!("File log level changed to {:?}", level);
}

fn file_level_enabled(level: Level) -> bool {
    level_to_u8(level) <= FILE_LOG_LEVEL.load(Ordering::Relaxed)
}

/// `--debug` raises the file log from info to debug.
fn file_level(debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn console_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

/// Initialize the tracing subscriber:
/// - Stderr: colored, respects RUST_LOG (stdout is reserved for the overlay)
/// - File (when `log_dir` is set): plain text, daily rotation, 7 days retention, non-blocking
pub fn init_tracing(log_dir: Option<&Path>, debug: bool) -> anyhow::Result<()> {
    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(console_filter(debug));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir {}", dir.display()))?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(7)
                .filename_prefix("wordsuggest")
                .filename_suffix("log")
                .build(dir)?;

            // Don't drop logs under pressure
            let (non_blocking_writer, guard) = NonBlockingBuilder::default()
                .lossy(false)
                .finish(file_appender);
            WORKER_GUARD.get_or_init(|| Mutex::new(Some(guard)));

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true)
                    .with_writer(non_blocking_writer)
                    .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                        file_level_enabled(*metadata.level())
                    })),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    match log_dir {
        Some(dir) => {
            set_file_log_level(file_level(debug));
            tracing::info!("Tracing initialized, log dir: {}", dir.display());
        }
        None => tracing::debug!("Tracing initialized, console only"),
    }

    Ok(())
}

/// Flush and release the file writer. Call once before exit.
pub fn shutdown_tracing() {
    if let Some(guard) = WORKER_GUARD.get() {
        if let Ok(mut guard) = guard.lock() {
            guard.take();
        }
    }
}

/// Root span correlating every log line of one application run.
pub fn session_span() -> tracing::Span {
    let session = uuid::Uuid::new_v4().to_string();
    tracing::info_span!("session", session = %session)
}

/// In-memory log sink for asserting on emitted events.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(std::sync::Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl CapturedLogs {
    pub(crate) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let writer = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

#[cfg(test)]
impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
