//! Append-only flight logs.
//!
//! Flight data goes to tab-separated text files with a one-line header:
//! one per domain (IMU, control, pressure), each written only by its owning
//! thread. The error log is shared by every thread, so writes go through a
//! bounded channel drained by a single writer worker.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::{error, warn};

/// Tab-separated append-only log owned by one thread.
pub struct TsvLogger {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl TsvLogger {
    /// Create the file and write the header line.
    pub fn create(path: impl Into<PathBuf>, header: &str) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        let mut logger = Self {
            writer: BufWriter::new(file),
            path,
        };
        logger.write_line(header)?;
        Ok(logger)
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}")
            .with_context(|| format!("Could not write to {}", self.path.display()))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Could not flush {}", self.path.display()))
    }
}

impl Drop for TsvLogger {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush {}: {e}", self.path.display());
        }
    }
}

/// Cloneable sender half of the error log.
///
/// Records carry the elapsed mission time; they are also mirrored to the
/// diagnostic log so errors show up on the console.
#[derive(Clone)]
pub struct ErrorLog {
    sender: Sender<String>,
    epoch: Instant,
}

impl ErrorLog {
    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!("{message}");
        let line = format!("{}\t{message}", self.epoch.elapsed().as_micros());
        match self.sender.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("error log queue full, dropping record"),
            Err(TrySendError::Disconnected(_)) => warn!("error log writer has shut down"),
        }
    }
}

/// Owner handle for the error log writer worker.
pub struct ErrorLogHandle {
    sender: Option<Sender<String>>,
    epoch: Instant,
    worker: Option<JoinHandle<()>>,
}

impl ErrorLogHandle {
    /// Create the error log file and start its writer worker.
    pub fn create(path: impl AsRef<Path>, epoch: Instant) -> Result<Self> {
        let mut logger = TsvLogger::create(path.as_ref(), "elapsed_us\tmessage")?;
        let (sender, receiver) = bounded::<String>(256);

        let worker = std::thread::spawn(move || {
            while let Ok(line) = receiver.recv() {
                if let Err(e) = logger.write_line(&line) {
                    warn!("error log write failed: {e}");
                }
                // Error records are rare and must survive a crash.
                let _ = logger.flush();
            }
        });

        Ok(Self {
            sender: Some(sender),
            epoch,
            worker: Some(worker),
        })
    }

    /// A sender other threads can keep.
    pub fn log(&self) -> ErrorLog {
        ErrorLog {
            sender: self.sender.clone().expect("error log still open"),
            epoch: self.epoch,
        }
    }

    /// Drain outstanding records and stop the worker.
    pub fn shutdown(mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ErrorLogHandle {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
