//! Tracing setup: human output on stdout plus an append-only `log.txt` shared
//! by every shaderreel process.
//!
//! Each event is written to the log file in one append while holding an
//! exclusive advisory lock, prefixed with `[PID n]` so interleaved processes
//! stay readable. Failures to write the log are ignored.
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use fs2::FileExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn initialise_tracing(log_file: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(PidLogFile::new(log_file)),
        )
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[derive(Debug, Clone)]
pub struct PidLogFile {
    path: PathBuf,
}

impl PidLogFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl<'a> MakeWriter<'a> for PidLogFile {
    type Writer = PidLogEntry<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        PidLogEntry {
            path: &self.path,
            buffer: Vec::new(),
        }
    }
}

/// Buffers one formatted event and appends it to the log file on drop.
pub struct PidLogEntry<'a> {
    path: &'a Path,
    buffer: Vec<u8>,
}

impl PidLogEntry<'_> {
    fn append(&self) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path)?;
        file.lock_exclusive()?;
        let mut entry = format!("[PID {}] ", std::process::id()).into_bytes();
        entry.extend_from_slice(&self.buffer);
        if !entry.ends_with(b"\n") {
            entry.push(b'\n');
        }
        let written = file.write_all(&entry);
        let _ = FileExt::unlock(&file);
        written
    }
}

impl Write for PidLogEntry<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PidLogEntry<'_> {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let _ = self.append();
    }
}
