//! The engine's info log: structured [`tracing`] events, optionally mirrored to a `LOG` file the
//! way the original LevelDB family of engines does, rotating any previous `LOG` to `LOG.old`.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Write;

use tracing::{level_filters::LevelFilter, Level as LogLevel};

/// How verbose the on-disk `LOG` file should be. Independent of whatever `tracing` subscriber
/// the embedding application installs; events are always emitted through `tracing` regardless of
/// this filter.
#[repr(u8)]
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InfoLogLevel {
    /// Do not write to a `LOG` file at all.
    Off = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Info = 3,
}

impl From<InfoLogLevel> for LevelFilter {
    fn from(level: InfoLogLevel) -> Self {
        match level {
            InfoLogLevel::Off => Self::OFF,
            InfoLogLevel::Error => Self::ERROR,
            InfoLogLevel::Warn => Self::WARN,
            InfoLogLevel::Info => Self::INFO,
        }
    }
}

pub(crate) struct InfoLogger<File> {
    file: Option<File>,
    file_filter: LevelFilter,
}

impl<File: Write> InfoLogger<File> {
    #[must_use]
    pub fn new(log_file: File, level: InfoLogLevel) -> Self {
        Self { file: Some(log_file), file_filter: LevelFilter::from(level) }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self { file: None, file_filter: LevelFilter::OFF }
    }

    pub fn log(&mut self, level: LogLevel, message: impl FnOnce() -> String) {
        let log_to_file = level <= self.file_filter;
        if !log_to_file && !tracing_enabled(level) {
            return;
        }

        let message = message();
        emit_tracing_event(level, &message);

        if log_to_file {
            if let Some(file) = self.file.as_mut() {
                let failed = file
                    .write_all(message.as_bytes())
                    .and_then(|()| file.write_all(b"\n"))
                    .err();
                if let Some(err) = failed {
                    tracing::event!(LogLevel::DEBUG, "failed writing to LOG file: {err}");
                }
            }
        }
    }
}

fn tracing_enabled(level: LogLevel) -> bool {
    match level {
        LogLevel::ERROR => tracing::event_enabled!(LogLevel::ERROR),
        LogLevel::WARN => tracing::event_enabled!(LogLevel::WARN),
        LogLevel::INFO => tracing::event_enabled!(LogLevel::INFO),
        LogLevel::DEBUG => tracing::event_enabled!(LogLevel::DEBUG),
        LogLevel::TRACE => tracing::event_enabled!(LogLevel::TRACE),
    }
}

fn emit_tracing_event(level: LogLevel, message: &str) {
    match level {
        LogLevel::ERROR => tracing::event!(LogLevel::ERROR, message),
        LogLevel::WARN => tracing::event!(LogLevel::WARN, message),
        LogLevel::INFO => tracing::event!(LogLevel::INFO, message),
        LogLevel::DEBUG => tracing::event!(LogLevel::DEBUG, message),
        LogLevel::TRACE => tracing::event!(LogLevel::TRACE, message),
    }
}

impl<File> Debug for InfoLogger<File> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("InfoLogger")
            .field("file", &self.file.as_ref().map(|_| "<LOG file>"))
            .field("file_filter", &self.file_filter)
            .finish()
    }
}

/// Renames an existing `LOG` to `LOG.old` and opens a fresh `LOG`, mirroring the rotation
/// convention used by the LevelDB family of engines. No-op (other than opening) if no old `LOG`
/// is present.
pub(crate) fn rotate_and_open_log_file(db_path: &std::path::Path) -> std::io::Result<std::fs::File> {
    let log_path = db_path.join("LOG");
    let old_log_path = db_path.join("LOG.old");
    if log_path.exists() {
        let _ = std::fs::rename(&log_path, &old_log_path);
    }
    std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(log_path)
}
