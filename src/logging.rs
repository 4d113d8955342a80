//! Kernel logger
//!
//! Routes `log` records to a sink supplied by the kernel (usually the
//! serial port). Lines are written whole with interrupts masked so records
//! from interrupt handlers never tear a line in half.

use alloc::string::String;
use core::fmt::{self, Write};

use ember_core::InterruptGuard;
use log::{Log, Metadata, Record, SetLoggerError};
use spin::{Mutex, Once};

use crate::config::Config;

/// Destination of formatted log lines
pub trait LogSink: Sync {
    fn write_line(&self, line: fmt::Arguments<'_>);
}

struct KernelLogger {
    sink: Once<&'static dyn LogSink>,
    // Raw spinlock: the reentrant kernel mutex logs itself.
    serial: Mutex<()>,
}

static LOGGER: KernelLogger = KernelLogger {
    sink: Once::new(),
    serial: Mutex::new(()),
};

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = self.sink.get() {
            let _interrupts = InterruptGuard::new();
            let _serial = self.serial.lock();
            sink.write_line(format_args!("{:<5} {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger writing to `sink`, filtered at
/// `config.log_level`
pub fn init(sink: &'static dyn LogSink, config: &Config) -> Result<(), SetLoggerError> {
    LOGGER.sink.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(config.log_level);
    log::info!("[log] kernel logger up at level {}", config.log_level);
    Ok(())
}

/// Keeps log lines in memory, e.g. until a console exists
pub struct MemorySink {
    buffer: Mutex<String>,
}

impl MemorySink {
    pub const fn new() -> Self {
        Self {
            buffer: Mutex::new(String::new()),
        }
    }

    /// Hand out everything logged so far and start over
    pub fn take(&self) -> String {
        core::mem::take(&mut *self.buffer.lock())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: fmt::Arguments<'_>) {
        let mut buffer = self.buffer.lock();
        // Writing into a String cannot fail.
        let _ = buffer.write_fmt(line);
        buffer.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_collects_lines() {
        let sink = MemorySink::new();
        sink.write_line(format_args!("{:<5} {}", log::Level::Warn, "[sched] hello"));
        sink.write_line(format_args!("second"));
        assert_eq!(sink.take(), "WARN  [sched] hello\nsecond\n");
        assert!(sink.take().is_empty());
    }

    // Other tests in this binary log too once the logger is up, so only
    // this test's own lines are checked.
    #[test]
    fn installed_logger_formats_and_filters() {
        static SINK: MemorySink = MemorySink::new();
        let config = Config {
            log_level: log::LevelFilter::Info,
            ..Config::default()
        };
        init(&SINK, &config).unwrap();
        assert!(init(&SINK, &config).is_err());

        log::warn!("[logtest] {} open descriptors", 3);
        log::info!("[logtest] plain info");
        log::debug!("[logtest] too chatty");

        let text = SINK.take();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.contains(&"INFO  [log] kernel logger up at level INFO"));
        assert!(lines.contains(&"WARN  [logtest] 3 open descriptors"));
        assert!(lines.contains(&"INFO  [logtest] plain info"));
        assert!(!text.contains("too chatty"));
    }
}
