//! Directory scanner pool
//!
//! Each scanner:
//! - Pulls directory paths from the scan queue
//! - Emits the directory's metadata block before descending
//! - Classifies each entry and routes it: subdirectories back to the scan
//!   queue, everything else (bar symlinks and excluded paths) to the file
//!   read queue
//! - Releases the directory's work credit when done

use crate::block::{Block, MAX_PATH_BYTES};
use crate::config::CreateConfig;
use crate::create::queue::{ScanQueueHandle, WorkTracker};
use crate::create::FailureSlot;
use crate::error::{FormatError, WorkerError};
use crate::fsmeta;
use crossbeam_channel::Sender;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How often an idle scanner re-checks the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Statistics collected by one scanner
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Directories fully processed
    pub dirs_scanned: AtomicU64,

    /// Entries examined across all directories
    pub entries_seen: AtomicU64,

    /// Entries skipped by exclude patterns
    pub excluded: AtomicU64,

    /// Symbolic links skipped
    pub symlinks_skipped: AtomicU64,

    /// Non-fatal errors encountered
    pub warnings: AtomicU64,
}

impl ScanStats {
    fn record_dir(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_entry(&self) {
        self.entries_seen.fetch_add(1, Ordering::Relaxed);
    }

    fn record_excluded(&self) {
        self.excluded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_symlink(&self) {
        self.symlinks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything a scanner worker needs; cloned once per worker
#[derive(Clone)]
pub struct ScannerContext {
    pub config: Arc<CreateConfig>,
    pub scan_queue: ScanQueueHandle,
    pub file_tx: Sender<String>,
    pub block_tx: Sender<Block>,
    pub tracker: Arc<WorkTracker>,
    pub shutdown: Arc<AtomicBool>,
    pub failure: Arc<FailureSlot>,
}

/// A worker thread that scans directories
pub struct DirectoryScanner {
    handle: Option<JoinHandle<()>>,
    stats: Arc<ScanStats>,
}

impl DirectoryScanner {
    /// Spawn a new scanner thread
    pub fn spawn(id: usize, ctx: ScannerContext) -> Result<Self, WorkerError> {
        let stats = Arc::new(ScanStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("dir-scanner-{}", id))
            .spawn(move || scanner_loop(id, ctx, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                name: "directory scanner",
                reason: e.to_string(),
            })?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    /// This scanner's statistics
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Wait for the scanner to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                name: "directory scanner",
            })?;
        }
        Ok(())
    }
}

/// Main scanner loop
///
/// Scanners both feed and drain the scan queue, so the queue is never
/// "closed" from the sending side; workers poll with a timeout and exit
/// when the coordinator raises the shutdown flag.
fn scanner_loop(id: usize, ctx: ScannerContext, stats: Arc<ScanStats>) {
    debug!(scanner = id, "directory scanner starting");

    while !ctx.shutdown.load(Ordering::Relaxed) {
        if let Some(path) = ctx.scan_queue.recv_timeout(POLL_INTERVAL) {
            scan_directory(&path, &ctx, &stats);
        }
    }

    debug!(scanner = id, "directory scanner stopped");
}

/// Process one directory unit
///
/// The unit's work credit is released on every exit path; children take
/// their own credit before this one is given back.
fn scan_directory(dir: &str, ctx: &ScannerContext, stats: &ScanStats) {
    if Path::new(dir).is_absolute() {
        ctx.failure.record(
            FormatError::AbsolutePath {
                path: dir.to_string(),
            }
            .into(),
        );
        ctx.shutdown.store(true, Ordering::SeqCst);
        ctx.tracker.done();
        return;
    }

    debug!(path = dir, "scanning directory");

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = dir, error = %e, "directory read error");
            stats.record_warning();
            ctx.tracker.done();
            return;
        }
    };

    let meta = match fs::metadata(dir) {
        Ok(meta) => fsmeta::ownership_of(&meta),
        Err(e) => {
            warn!(path = dir, error = %e, "directory stat error; uid/gid/mode will be incorrect");
            stats.record_warning();
            Default::default()
        }
    };

    // The directory's own block goes out before any child is enqueued, so
    // no descendant block can precede it in the archive.
    let block = Block::Directory {
        path: dir.to_string(),
        meta,
    };
    if ctx.block_tx.send(block).is_err() {
        // Writer is gone; teardown is in progress.
        ctx.tracker.done();
        return;
    }

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = dir, error = %e, "error reading directory");
                stats.record_warning();
                ctx.failure.record(e.into());
                continue;
            }
        };
        stats.record_entry();

        let child = Path::new(dir).join(entry.file_name());
        let child_path = match child.to_str() {
            Some(p) => p,
            None => {
                warn!(path = %child.display(), "skipping non-UTF-8 path");
                stats.record_warning();
                continue;
            }
        };
        if child_path.len() > MAX_PATH_BYTES {
            warn!(path = child_path, "skipping path longer than the frame format allows");
            stats.record_warning();
            continue;
        }

        if ctx.config.is_excluded(child_path) {
            debug!(path = child_path, "skipping excluded file");
            stats.record_excluded();
            continue;
        }

        // DirEntry::file_type is an lstat: symlinks are seen as such, not
        // followed.
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                warn!(path = child_path, error = %e, "unable to lstat file");
                stats.record_warning();
                continue;
            }
        };
        if file_type.is_symlink() {
            debug!(path = child_path, "skipping symbolic link");
            stats.record_symlink();
            continue;
        }

        ctx.tracker.add(1);
        if file_type.is_dir() {
            ctx.scan_queue.push_detached(child_path.to_string());
        } else if ctx.file_tx.send(child_path.to_string()).is_err() {
            // Reader pool is gone; give the credit back.
            ctx.tracker.done();
        }
    }

    stats.record_dir();
    ctx.tracker.done();
}
