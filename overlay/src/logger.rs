use flexi_logger::{DeferredNow, FileSpec, FlexiLoggerError, Logger, LoggerHandle, WriteMode};
use log::Record;
use std::io::Write;
use std::path::PathBuf;
use std::{process, thread};

pub const DEFAULT_SPEC: &str = "overlay=debug,shared=info";

/// `%TEMP%/coach-bridge-overlay`; the host's working directory may not be writable.
pub fn log_directory() -> PathBuf {
    std::env::temp_dir().join("coach-bridge-overlay")
}

/// File logger for the injected module, one file per host process. Must not be called under the
/// loader lock. Keep the handle alive until the module unloads.
///
/// Direct writes: a flusher thread would keep running in the module's code after it unloads.
pub fn init_logger(spec: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_str(spec)?
        .log_to_file(
            FileSpec::default()
                .directory(log_directory())
                .basename("overlay")
                .discriminant(format!("pid{}", process::id()))
                .suppress_timestamp(),
        )
        .append()
        .write_mode(WriteMode::Direct)
        .format(log_format)
        .start()
}

/// `timestamp [LEVEL] [file:line] [thread] message`
fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "{} [{:<5}] [{}:{}] [{}] {}",
        now.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        thread::current().name().unwrap_or("<unnamed>"),
        &record.args()
    )
}
