//! Bridge from the `log` facade to the application's log callback.

use std::sync::Arc;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::callbacks::CallbackSet;

/// A [`log::Log`] implementation forwarding records to the callback set's
/// log sink. Records are dropped silently when no sink is installed.
pub struct CallbackLogger {
  callbacks: Arc<CallbackSet>,
  max_level: LevelFilter,
}

impl CallbackLogger {
  pub fn new(callbacks: Arc<CallbackSet>, max_level: LevelFilter) -> CallbackLogger {
    CallbackLogger {
      callbacks,
      max_level,
    }
  }
}

impl Log for CallbackLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= self.max_level
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    if let Some(cb) = &self.callbacks.log {
      cb(
        record.file().unwrap_or("<unknown>"),
        record.line().unwrap_or(0),
        record.module_path().unwrap_or("<unknown>"),
        &record.level().to_string(),
        &record.args().to_string(),
      );
    }
  }

  fn flush(&self) {}
}

/// Install a [`CallbackLogger`] as the process-wide logger. May be called
/// once per process; later calls fail like any second logger installation.
pub fn install_callback_logger(
  callbacks: Arc<CallbackSet>,
  max_level: LevelFilter,
) -> Result<(), SetLoggerError> {
  log::set_boxed_logger(Box::new(CallbackLogger::new(callbacks, max_level)))?;
  log::set_max_level(max_level);
  Ok(())
}
