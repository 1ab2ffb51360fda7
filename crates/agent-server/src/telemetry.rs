//! Tracing setup: console output filtered by `RUST_LOG`, plus a plain-text
//! debug log under the configured log directory, rotated by size.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE: &str = "retail_insights.log";

/// Rotate once the active file would exceed 10 MiB
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated files kept next to the active one (`.1` newest)
pub const LOG_BACKUPS: usize = 5;

const CONSOLE_DEFAULT: &str = "info,tower_http=debug";
const FILE_FILTER: &str = "debug,hyper=info,hyper_util=info,h2=info,reqwest=info,rustls=info";

pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let path = log_dir.join(LOG_FILE);
    let file = RotatingFile::open(&path, MAX_LOG_BYTES, LOG_BACKUPS)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let console = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(CONSOLE_DEFAULT)),
    );
    let logfile = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry()
        .with(console)
        .with(logfile)
        .try_init()
        .context("installing tracing subscriber")?;

    tracing::debug!(path = %path.display(), max_bytes = MAX_LOG_BYTES, backups = LOG_BACKUPS, "file logging enabled");
    Ok(())
}

/// Append-only log file that shifts itself to `<name>.1 .. <name>.N` when full.
///
/// Each formatted event arrives as a single write, so rotation never splits a line.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
