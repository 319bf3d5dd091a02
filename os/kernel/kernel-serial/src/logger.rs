use crate::serial_trace;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing `"[LEVEL] target: message"` lines to the serial console.
pub struct SerialLogger {
    max_level: LevelFilter,
}

impl SerialLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        static LOGGER: kernel_sync::SyncOnceCell<SerialLogger> = kernel_sync::SyncOnceCell::new();

        let max_level = self.max_level;
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        serial_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn filters_by_level() {
        let logger = SerialLogger::new(LevelFilter::Info);
        let warn = Metadata::builder().level(Level::Warn).target("mm").build();
        let trace = Metadata::builder().level(Level::Trace).target("mm").build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&trace));
    }
}
