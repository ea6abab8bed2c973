//! Size-bounded, rotating log file
//!
//! Every supervisor component writes its diagnostics through a [`LogWriter`].
//! Lines have the form `timestamp - LEVEL - message`. When the active file
//! would reach `max_bytes`, it is renamed to `<name>.1` (older backups shift
//! up by one, the oldest is deleted) and a fresh file is opened before the
//! line is written, so the line that triggered the rotation is never lost.
//!
//! I/O failures never propagate to callers: they are reported on stderr and
//! the next write reopens the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;

use crate::errors::{SharedError, SharedResult};

/// Default size limit of the active log file (5 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Default number of numbered backups kept next to the active file
pub const DEFAULT_BACKUP_COUNT: usize = 5;

/// Log file location and rotation policy
#[derive(Debug, Clone)]
pub struct LogFileConfig {
    pub dir: PathBuf,
    pub file_name: String,
    pub max_bytes: u64,
    pub backup_count: usize,
    /// Also echo every `append` to stderr
    pub echo_to_console: bool,
}

impl LogFileConfig {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
            echo_to_console: true,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_backup_count(mut self, backup_count: usize) -> Self {
        self.backup_count = backup_count;
        self
    }

    pub fn with_console_echo(mut self, echo: bool) -> Self {
        self.echo_to_console = echo;
        self
    }

    pub fn active_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn backup_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", self.file_name, index))
    }
}

/// Cloneable handle to a rotating log file; clones share one file handle.
#[derive(Clone)]
pub struct LogWriter {
    config: Arc<LogFileConfig>,
    state: Arc<Mutex<ActiveFile>>,
}

struct ActiveFile {
    file: Option<File>,
    size: u64,
    rotations: u64,
}

impl LogWriter {
    /// Open (or create) the active log file, rotating it right away if it is
    /// already at the size limit.
    pub fn open(config: LogFileConfig) -> SharedResult<Self> {
        fs::create_dir_all(&config.dir).map_err(|e| SharedError::log_io("creating", &config.dir, e))?;

        let mut active = ActiveFile {
            file: None,
            size: 0,
            rotations: 0,
        };
        active
            .ensure_open(&config)
            .map_err(|e| SharedError::log_io("opening", &config.active_path(), e))?;
        if active.size >= config.max_bytes {
            active
                .rotate(&config)
                .map_err(|e| SharedError::log_io("rotating", &config.active_path(), e))?;
        }

        Ok(Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(active)),
        })
    }

    /// Write `timestamp - LEVEL - message` to the file and, when configured,
    /// to stderr.
    pub fn append(&self, level: &str, message: &str) {
        let line = format_line(level, message);
        if self.config.echo_to_console {
            eprint!("{line}");
        }
        self.write_line(&line);
    }

    /// Write to the file only. Used by the tracing layer, whose events are
    /// already printed by the console formatter.
    pub fn record(&self, level: &str, message: &str) {
        self.write_line(&format_line(level, message));
    }

    pub fn active_path(&self) -> PathBuf {
        self.config.active_path()
    }

    pub fn config(&self) -> &LogFileConfig {
        &self.config
    }

    /// Number of rotations performed since this writer was opened
    pub fn rotation_count(&self) -> u64 {
        self.lock().rotations
    }

    fn write_line(&self, line: &str) {
        let mut active = self.lock();
        if let Err(e) = active.write(line.as_bytes(), &self.config) {
            // Leave the handle closed; the next write reopens it.
            active.file = None;
            report_io_error(&SharedError::log_io("writing", &self.config.active_path(), e));
        }
    }

    fn lock(&self) -> MutexGuard<'_, ActiveFile> {
        // Poisoning only means another writer panicked mid-line
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActiveFile {
    fn ensure_open(&mut self, config: &LogFileConfig) -> io::Result<()> {
        if self.file.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(config.active_path())?;
            self.size = file.metadata()?.len();
            self.file = Some(file);
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], config: &LogFileConfig) -> io::Result<()> {
        self.ensure_open(config)?;

        let len = bytes.len() as u64;
        if self.size > 0 && self.size + len >= config.max_bytes {
            self.rotate(config)?;
        }

        if let Some(file) = self.file.as_mut() {
            file.write_all(bytes)?;
            file.flush()?;
            self.size += len;
        }

        // Only reachable when a single line is larger than the limit
        if self.size >= config.max_bytes {
            self.rotate(config)?;
        }
        Ok(())
    }

    /// Close the active file, shift backups up by one and reopen a fresh file.
    fn rotate(&mut self, config: &LogFileConfig) -> io::Result<()> {
        self.file = None;

        let active = config.active_path();
        if config.backup_count == 0 {
            remove_if_exists(&active)?;
        } else {
            remove_if_exists(&config.backup_path(config.backup_count))?;
            for index in (1..config.backup_count).rev() {
                let from = config.backup_path(index);
                if from.exists() {
                    fs::rename(&from, config.backup_path(index + 1))?;
                }
            }
            if active.exists() {
                fs::rename(&active, config.backup_path(1))?;
            }
        }

        self.rotations += 1;
        self.ensure_open(config)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn format_line(level: &str, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("{timestamp} - {} - {}\n", level.to_uppercase(), message.trim_end())
}

/// Console fallback for failures of the log file itself
fn report_io_error(error: &SharedError) {
    eprintln!("[log-writer] {error}");
}
