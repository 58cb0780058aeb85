//! Logging context.
//!
//! [`LogContext`] is created once at startup and installed as the
//! `tracing-subscriber` writer. Every formatted event goes to stdout and to
//! a timestamped log file. The first call to [`LogContext::configure_file`]
//! names that file; if an event is written before any file was configured
//! the context opens one under its default directory and keeps it.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";
/// Default log file prefix.
pub const DEFAULT_LOG_PREFIX: &str = "provisioning_log";

#[derive(Debug)]
enum LogFile {
    /// Nothing configured or opened yet.
    Unset,
    /// Named but not yet created.
    Configured(PathBuf),
    Open { path: PathBuf, file: File },
    /// Opening failed; console only from here on.
    Failed,
}

#[derive(Debug)]
struct Inner {
    default_dir: PathBuf,
    default_prefix: String,
    console: bool,
    file: Mutex<LogFile>,
}

/// Shared handle to the process log sink.
#[derive(Debug, Clone)]
pub struct LogContext {
    inner: Arc<Inner>,
}

/// Builds `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.log`.
#[must_use]
pub fn timestamped_log_path(dir: &Path, prefix: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}_{stamp}.log"))
}

impl LogContext {
    /// A context that falls back to `default_dir`/`default_prefix` when
    /// nothing else is configured.
    pub fn new(default_dir: impl Into<PathBuf>, default_prefix: impl Into<String>) -> Self {
        Self::build(default_dir.into(), default_prefix.into(), true)
    }

    /// Same as [`LogContext::new`] but without the console copy.
    pub fn file_only(default_dir: impl Into<PathBuf>, default_prefix: impl Into<String>) -> Self {
        Self::build(default_dir.into(), default_prefix.into(), false)
    }

    fn build(default_dir: PathBuf, default_prefix: String, console: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                default_dir,
                default_prefix,
                console,
                file: Mutex::new(LogFile::Unset),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogFile> {
        self.inner
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Names the log file. Returns false (and changes nothing) if a file
    /// was already configured or opened.
    pub fn configure_file(&self, dir: &Path, prefix: &str) -> bool {
        let mut file = self.lock();
        if !matches!(*file, LogFile::Unset) {
            return false;
        }
        *file = LogFile::Configured(timestamped_log_path(dir, prefix));
        true
    }

    /// Path of the log file, once one is configured or open.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        match &*self.lock() {
            LogFile::Configured(path) | LogFile::Open { path, .. } => Some(path.clone()),
            LogFile::Unset | LogFile::Failed => None,
        }
    }

    fn open(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn write_file(&self, buf: &[u8]) {
        let mut state = self.lock();
        if matches!(*state, LogFile::Unset) {
            *state = LogFile::Configured(timestamped_log_path(
                &self.inner.default_dir,
                &self.inner.default_prefix,
            ));
        }
        if let LogFile::Configured(path) = &*state {
            let path = path.clone();
            *state = match Self::open(&path) {
                Ok(file) => LogFile::Open { path, file },
                Err(e) => {
                    eprintln!("cannot open log file {}: {e}", path.display());
                    LogFile::Failed
                }
            };
        }
        if let LogFile::Open { file, .. } = &mut *state {
            let _ = file.write_all(buf);
        }
    }
}

/// Writer handed out per formatted event.
#[derive(Debug)]
pub struct LogWriter {
    ctx: LogContext,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.ctx.inner.console {
            io::stdout().write_all(buf)?;
        }
        self.ctx.write_file(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.ctx.inner.console {
            io::stdout().flush()?;
        }
        if let LogFile::Open { file, .. } = &mut *self.ctx.lock() {
            file.flush()?;
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogContext {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter { ctx: self.clone() }
    }
}
