use crate::trace_fmt::TraceSink;
use core::fmt;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct BootLogger {
    max_level: LevelFilter,
}

impl BootLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed first.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

/// Format a record as `[LEVEL] target: message\n`.
///
/// # Errors
/// Propagates errors of the underlying writer.
pub fn write_record<W>(w: &mut W, record: &Record) -> fmt::Result
where
    W: fmt::Write + ?Sized,
{
    writeln!(w, "[{}] {}: {}", record.level(), record.target(), record.args())
}

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = write_record(&mut TraceSink, record);
    }

    fn flush(&self) {}
}
