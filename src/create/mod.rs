//! Archive creation pipeline
//!
//! Four cooperating components, stitched together by bounded channels:
//!
//! ```text
//!  seed dirs ──► DirScanQueue ──► DirectoryScanner pool ──┐
//!                    ▲                │        │          │ Directory blocks
//!                    └── subdirs ─────┘        │          ▼
//!                                        FileReadQueue  BlockQueue ──► ArchiveWriter ──► output
//!                                              │          ▲
//!                                              ▼          │ Start/Data*/End
//!                                       FileReader pool ──┘
//! ```
//!
//! Termination is driven by the outstanding-work counter: every enqueued
//! directory or file holds one credit from enqueue to completion. When the
//! counter reaches zero the coordinator stops the scanner pool, then drops
//! the file queue sender, then the block queue sender, so each downstream
//! stage drains naturally after its producers are done.

pub mod queue;
pub mod reader;
pub mod scanner;
pub mod writer;

pub use queue::{ScanQueue, ScanQueueHandle, WorkTracker};
pub use reader::{FileReader, ReadStats};
pub use scanner::{DirectoryScanner, ScanStats, ScannerContext};
pub use writer::{ArchiveWriter, ArchiveWriterTask, HashingWriter, WriterStats};

use crate::block::MAX_PATH_BYTES;
use crate::config::CreateConfig;
use crate::error::{ArchiveError, FormatError, Result};
use crossbeam_channel::bounded;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How often the supervisor re-checks the shutdown flag while waiting for
/// the work counter
const SUPERVISOR_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the first fatal error of a run
///
/// Workers record into this slot and keep going where the protocol allows;
/// the coordinator surfaces the error once the pipeline has settled.
#[derive(Debug, Default)]
pub struct FailureSlot {
    slot: Mutex<Option<ArchiveError>>,
}

impl FailureSlot {
    /// Record an error; the first one wins
    pub fn record(&self, err: ArchiveError) {
        let mut slot = self.slot.lock().expect("failure slot poisoned");
        slot.get_or_insert(err);
    }

    /// Take the recorded error, if any
    pub fn take(&self) -> Option<ArchiveError> {
        self.slot.lock().expect("failure slot poisoned").take()
    }
}

/// Result of a completed create run
#[derive(Debug, Default)]
pub struct CreateSummary {
    /// Directories archived
    pub dirs: u64,

    /// Files archived
    pub files: u64,

    /// File bytes read
    pub bytes_read: u64,

    /// Blocks written (checkpoints excluded)
    pub blocks_written: u64,

    /// Archive bytes emitted
    pub bytes_written: u64,

    /// Entries skipped by exclude patterns
    pub excluded: u64,

    /// Symbolic links skipped
    pub symlinks_skipped: u64,

    /// Non-fatal errors along the way
    pub warnings: u64,

    /// Wall-clock time for the run
    pub duration: Duration,
}

/// Coordinates the concurrent create pipeline
pub struct Archiver {
    config: Arc<CreateConfig>,
    roots: Vec<String>,
    tracker: Arc<WorkTracker>,
    shutdown: Arc<AtomicBool>,
    failure: Arc<FailureSlot>,
}

impl Archiver {
    /// Create a new archiver for the given configuration
    pub fn new(config: CreateConfig) -> Self {
        Self {
            config: Arc::new(config),
            roots: Vec::new(),
            tracker: Arc::new(WorkTracker::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(FailureSlot::default()),
        }
    }

    /// Add a seed directory
    ///
    /// Absolute paths are rejected here, before any thread is spawned;
    /// they are equally fatal if a scanner meets one later.
    pub fn add_root(&mut self, root: &Path) -> Result<()> {
        if root.is_absolute() {
            return Err(FormatError::AbsolutePath {
                path: root.display().to_string(),
            }
            .into());
        }
        let path = root.to_str().ok_or(FormatError::InvalidPath)?;
        if path.len() > MAX_PATH_BYTES {
            return Err(FormatError::InvalidPath.into());
        }
        self.roots.push(path.to_string());
        Ok(())
    }

    /// Run the pipeline to completion, writing the archive to `output`
    pub fn run<W: Write + Send + 'static>(self, output: W) -> Result<CreateSummary> {
        let Archiver {
            config,
            roots,
            tracker,
            shutdown,
            failure,
        } = self;

        let start = Instant::now();
        info!(
            roots = roots.len(),
            dir_readers = config.dir_readers,
            file_readers = config.file_readers,
            block_size = config.block_size,
            multicpu = config.multicpu,
            "starting archive creation"
        );

        let scan_queue = ScanQueue::new(config.scan_queue_size);
        let (file_tx, file_rx) = bounded::<String>(config.read_queue_size);
        let (block_tx, block_rx) = bounded(config.block_queue_size);

        let writer = ArchiveWriterTask::spawn(
            output,
            block_rx,
            Arc::clone(&failure),
            Arc::clone(&shutdown),
        )?;

        let mut scanners = Vec::with_capacity(config.dir_readers);
        for id in 0..config.dir_readers {
            let ctx = ScannerContext {
                config: Arc::clone(&config),
                scan_queue: scan_queue.handle(),
                file_tx: file_tx.clone(),
                block_tx: block_tx.clone(),
                tracker: Arc::clone(&tracker),
                shutdown: Arc::clone(&shutdown),
                failure: Arc::clone(&failure),
            };
            scanners.push(DirectoryScanner::spawn(id, ctx)?);
        }

        let mut readers = Vec::with_capacity(config.file_readers);
        for id in 0..config.file_readers {
            readers.push(FileReader::spawn(
                id,
                file_rx.clone(),
                block_tx.clone(),
                Arc::clone(&tracker),
                config.block_size,
            )?);
        }
        drop(file_rx);

        // Seed the scan queue; each root carries one work credit.
        let seeder = scan_queue.handle();
        for root in roots {
            tracker.add(1);
            if !seeder.push(root) {
                break;
            }
        }
        drop(seeder);

        // Supervise until every unit is accounted for, or a fatal error
        // raised the shutdown flag.
        while !tracker.wait_idle(SUPERVISOR_INTERVAL) {
            if shutdown.load(Ordering::Relaxed) {
                debug!("supervisor observed shutdown before quiescence");
                break;
            }
        }

        // Close in dependency order: stop the scanner pool first, then the
        // file queue, then the block queue.
        shutdown.store(true, Ordering::SeqCst);

        let mut summary = CreateSummary::default();
        for scanner in scanners {
            let stats = scanner.stats();
            summary.dirs += stats.dirs_scanned.load(Ordering::Relaxed);
            summary.excluded += stats.excluded.load(Ordering::Relaxed);
            summary.symlinks_skipped += stats.symlinks_skipped.load(Ordering::Relaxed);
            summary.warnings += stats.warnings.load(Ordering::Relaxed);
            scanner.join()?;
        }
        drop(scan_queue);
        drop(file_tx);

        for reader in readers {
            let stats = reader.stats();
            summary.files += stats.files_read.load(Ordering::Relaxed);
            summary.bytes_read += stats.bytes_read.load(Ordering::Relaxed);
            summary.warnings += stats.warnings.load(Ordering::Relaxed);
            reader.join()?;
        }
        drop(block_tx);

        // The writer records its byte total only once it has drained and
        // written the final checkpoint, so join before reading.
        let writer_stats = writer.stats();
        writer.join()?;
        summary.blocks_written = writer_stats.blocks_written.load(Ordering::Relaxed);
        summary.bytes_written = writer_stats.bytes_written.load(Ordering::Relaxed);
        summary.duration = start.elapsed();

        if let Some(err) = failure.take() {
            return Err(err);
        }

        info!(
            dirs = summary.dirs,
            files = summary.files,
            bytes = summary.bytes_read,
            duration_ms = summary.duration.as_millis() as u64,
            "archive creation completed"
        );
        Ok(summary)
    }
}
