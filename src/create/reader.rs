//! File reader pool
//!
//! Each reader pulls file paths from the read queue and turns one file
//! into its block sequence: StartOfFile with ownership metadata, zero or
//! more Data blocks in file-byte order, then EndOfFile. A single reader
//! owns a file from open to close, which is what guarantees in-file
//! ordering on the shared block queue.

use crate::block::Block;
use crate::create::queue::WorkTracker;
use crate::error::WorkerError;
use crate::fsmeta;
use crossbeam_channel::{Receiver, Sender};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Statistics collected by one file reader
#[derive(Debug, Default)]
pub struct ReadStats {
    /// Files fully read into the archive
    pub files_read: AtomicU64,

    /// File bytes read
    pub bytes_read: AtomicU64,

    /// Non-fatal errors encountered
    pub warnings: AtomicU64,
}

impl ReadStats {
    fn record_file(&self) {
        self.files_read.fetch_add(1, Ordering::Relaxed);
    }

    fn record_bytes(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }
}

/// A worker thread that reads files into block sequences
pub struct FileReader {
    handle: Option<JoinHandle<()>>,
    stats: Arc<ReadStats>,
}

impl FileReader {
    /// Spawn a new reader thread
    pub fn spawn(
        id: usize,
        file_rx: Receiver<String>,
        block_tx: Sender<Block>,
        tracker: Arc<WorkTracker>,
        block_size: u16,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(ReadStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("file-reader-{}", id))
            .spawn(move || reader_loop(id, file_rx, block_tx, tracker, block_size, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                name: "file reader",
                reason: e.to_string(),
            })?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    /// This reader's statistics
    pub fn stats(&self) -> &ReadStats {
        &self.stats
    }

    /// Wait for the reader to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                name: "file reader",
            })?;
        }
        Ok(())
    }
}

/// Main reader loop; ends when the scan pool and coordinator have dropped
/// their senders
fn reader_loop(
    id: usize,
    file_rx: Receiver<String>,
    block_tx: Sender<Block>,
    tracker: Arc<WorkTracker>,
    block_size: u16,
    stats: Arc<ReadStats>,
) {
    debug!(reader = id, "file reader starting");

    for path in file_rx.iter() {
        read_file(&path, &block_tx, block_size, &stats);
        tracker.done();
    }

    debug!(reader = id, "file reader stopped");
}

/// Emit one file's block sequence
///
/// An open failure emits nothing at all. A mid-read failure truncates the
/// file in the archive but still emits EndOfFile so the extractor closes
/// the path cleanly.
fn read_file(path: &str, block_tx: &Sender<Block>, block_size: u16, stats: &ReadStats) {
    debug!(path, "reading file");

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(path, error = %e, "file open error");
            stats.record_warning();
            return;
        }
    };

    let meta = match file.metadata() {
        Ok(meta) => fsmeta::ownership_of(&meta),
        Err(e) => {
            warn!(path, error = %e, "file stat error; uid/gid/mode will be incorrect");
            stats.record_warning();
            Default::default()
        }
    };

    let start = Block::StartOfFile {
        path: path.to_string(),
        meta,
    };
    if block_tx.send(start).is_err() {
        return;
    }

    loop {
        // Each Data block owns a fresh buffer: blocks for many files are
        // in flight on the queue at once.
        let mut buffer = vec![0u8; block_size as usize];
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(path, error = %e, "file read error; file contents will be incomplete");
                stats.record_warning();
                break;
            }
        };
        buffer.truncate(n);
        stats.record_bytes(n as u64);

        let block = Block::Data {
            path: path.to_string(),
            payload: buffer,
        };
        if block_tx.send(block).is_err() {
            return;
        }
    }

    let end = Block::EndOfFile {
        path: path.to_string(),
    };
    if block_tx.send(end).is_err() {
        return;
    }
    stats.record_file();
}
