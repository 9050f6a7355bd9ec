use flexi_logger::{DeferredNow, FileSpec, FlexiLoggerError, Logger, LoggerHandle, WriteMode};
use log::Record;
use std::io::Write;
use std::thread;

/// Default spec until the config file has been read.
pub const DEFAULT_SPEC: &str = "controller=info,shared=info";

/// Starts the file logger under `logs/`. Keep the handle alive for the lifetime of the process;
/// use [`LoggerHandle::parse_new_spec`] to apply the configured level later.
pub fn init_logger(spec: &str) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_str(spec)?
        .log_to_file(FileSpec::default().directory("logs").suppress_timestamp())
        .append()
        .write_mode(WriteMode::BufferAndFlush)
        .format(log_format)
        .start()
}

/// `timestamp [LEVEL] [file:line] [thread] message`
pub fn log_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
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
