//! Logging setup for Transcode Watcher
//!
//! Every event goes to the screen. A service log file can be attached once
//! the configuration is known and is closed explicitly at shutdown.

use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::{self, time::ChronoLocal, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared handle to the optional service log file
///
/// Writes are dropped while no file is attached.
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    inner: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `<prefix>.<YYYY-MM-DD.HH-MM-SS>` and attach it
    ///
    /// Missing parent directories are created. Returns the opened path.
    pub fn open(&self, prefix: &Path) -> io::Result<PathBuf> {
        let path = timestamped_path(prefix, Local::now());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        *self.lock() = Some(file);
        Ok(path)
    }

    /// Flush and detach the file
    pub fn close(&self) {
        if let Some(mut file) = self.lock().take() {
            let _ = file.flush();
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer handed to the fmt layer for one event
pub struct LogFileWriter<'a>(MutexGuard<'a, Option<File>>);

impl Write for LogFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(self.lock())
    }
}

/// Service log path for a given start time
pub fn timestamped_path(prefix: &Path, at: DateTime<Local>) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(".");
    path.push(at.format("%Y-%m-%d.%H-%M-%S").to_string());
    PathBuf::from(path)
}

/// Install the global subscriber: screen output plus the `log_file` sink
///
/// Verbosity follows `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(log_file: LogFile) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let screen = fmt::layer()
        .with_target(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));
    let file = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_writer(log_file);

    tracing_subscriber::registry()
        .with(filter)
        .with(screen)
        .with(file)
        .try_init()
}
