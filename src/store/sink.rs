//! Persistence sinks for execution snapshots
//!
//! The record manager hands a full snapshot to the sink on every status change.
//! Sinks see committed snapshots only, never in-progress mutation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{PlanexError, Result};

use super::execution::Execution;

/// External durable store for execution snapshots
///
/// `persist` runs with the record lock held, from inside tokio workers:
/// implementations hand slow I/O off instead of doing it inline.
pub trait ExecutionSink: Send + Sync {
    fn persist(&self, snapshot: &Execution) -> Result<()>;
}

/// Keeps every snapshot in memory (history inspection, tests)
#[derive(Debug, Default)]
pub struct MemorySink {
    snapshots: Mutex<Vec<Execution>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot persisted so far, oldest first
    pub fn snapshots(&self) -> Vec<Execution> {
        self.snapshots.lock().clone()
    }

    pub fn last(&self) -> Option<Execution> {
        self.snapshots.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl ExecutionSink for MemorySink {
    fn persist(&self, snapshot: &Execution) -> Result<()> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

enum WriterMsg {
    Line(String),
    Flush(mpsc::Sender<std::result::Result<(), String>>),
}

/// Appends one JSON snapshot per line (NDJSON)
///
/// `persist` only serializes and queues the line; a dedicated writer thread
/// does the blocking file I/O, so the record lock is never held across a
/// write. Lines land in the order they were queued. Dropping the sink drains
/// the queue and joins the writer.
pub struct JsonlSink {
    tx: Mutex<Option<mpsc::Sender<WriterMsg>>>,
    writer: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl JsonlSink {
    /// Open (or create) `path` in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PlanexError::PersistenceError {
                reason: format!("cannot open {}: {}", path.display(), e),
            })?;

        tracing::debug!(path = %path.display(), "Opened snapshot file");

        let (tx, rx) = mpsc::channel();
        let writer = std::thread::Builder::new()
            .name("planex-snapshots".to_string())
            .spawn({
                let path = path.clone();
                move || write_loop(BufWriter::new(file), &path, rx)
            })?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            writer: Some(writer),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every queued snapshot is on disk
    ///
    /// Reports the first write error since the previous flush.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::channel();
        self.send(WriterMsg::Flush(ack_tx))?;
        ack_rx
            .recv()
            .map_err(|_| self.writer_gone())?
            .map_err(|reason| PlanexError::PersistenceError { reason })
    }

    fn send(&self, msg: WriterMsg) -> Result<()> {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(msg).map_err(|_| self.writer_gone()),
            None => Err(self.writer_gone()),
        }
    }

    fn writer_gone(&self) -> PlanexError {
        PlanexError::PersistenceError {
            reason: format!("snapshot writer for {} has stopped", self.path.display()),
        }
    }
}

fn write_loop(
    mut writer: BufWriter<File>,
    path: &Path,
    rx: mpsc::Receiver<WriterMsg>,
) {
    let mut first_error: Option<String> = None;
    for msg in rx {
        match msg {
            WriterMsg::Line(line) => {
                if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
                    let reason = format!("write to {}: {}", path.display(), e);
                    tracing::warn!(%reason, "Failed to write snapshot");
                    first_error.get_or_insert(reason);
                }
            }
            WriterMsg::Flush(ack) => {
                let _ = ack.send(first_error.take().map_or(Ok(()), Err));
            }
        }
    }
}

impl ExecutionSink for JsonlSink {
    fn persist(&self, snapshot: &Execution) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.send(WriterMsg::Line(json))
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        // Closing the channel ends the write loop once the queue is drained
        self.tx.get_mut().take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!(path = %self.path.display(), "Snapshot writer panicked");
            }
        }
    }
}
