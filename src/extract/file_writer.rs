//! Per-path file writer task
//!
//! One task owns one destination file from StartOfFile to EndOfFile. If
//! the file cannot be created the task stays alive in a drain-only state
//! so the parser's channel for this path keeps flowing until the end
//! block arrives.

use crate::block::{Block, Ownership};
use crate::config::ExtractConfig;
use crate::error::WorkerError;
use crate::extract::ExtractStats;
use crate::fsmeta;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Capacity of each per-path channel: one block of lookahead, matching the
/// parser's dispatch granularity
const PER_FILE_QUEUE: usize = 1;

/// The parser's handle on one open path
pub struct FileWriterHandle {
    sender: Sender<Block>,
    handle: JoinHandle<()>,
}

impl FileWriterHandle {
    /// Spawn the writer task for `path`
    pub fn spawn(
        path: String,
        meta: Ownership,
        config: Arc<ExtractConfig>,
        stats: Arc<ExtractStats>,
    ) -> Result<Self, WorkerError> {
        let (sender, receiver) = bounded(PER_FILE_QUEUE);

        let handle = thread::Builder::new()
            .name("file-writer".into())
            .spawn(move || writer_loop(path, meta, config, receiver, stats))
            .map_err(|e| WorkerError::SpawnFailed {
                name: "file writer",
                reason: e.to_string(),
            })?;

        Ok(Self { sender, handle })
    }

    /// Forward a block to the task; blocks while the task is busy writing
    pub fn send(&self, block: Block) {
        if self.sender.send(block).is_err() {
            warn!("file writer exited before its channel closed");
        }
    }

    /// Close the channel and release the join handle for reaping
    pub fn finish(self) -> JoinHandle<()> {
        drop(self.sender);
        self.handle
    }
}

fn writer_loop(
    path: String,
    meta: Ownership,
    config: Arc<ExtractConfig>,
    receiver: Receiver<Block>,
    stats: Arc<ExtractStats>,
) {
    debug!(path, "writing file");

    let mut out = if config.dry_run {
        None
    } else {
        match File::create(&path) {
            Ok(file) => {
                if !config.ignore_owners {
                    fsmeta::restore_file_owner(&file, &path, &meta);
                }
                if !config.ignore_perms {
                    fsmeta::restore_file_mode(&file, &path, meta.mode);
                }
                Some(BufWriter::new(file))
            }
            Err(e) => {
                warn!(path, error = %e, "file create error");
                stats.record_warning();
                None
            }
        }
    };

    for block in receiver.iter() {
        match block {
            Block::Data { payload, .. } => {
                stats.record_bytes(payload.len() as u64);
                if let Some(writer) = &mut out {
                    if let Err(e) = writer.write_all(&payload) {
                        warn!(path, error = %e, "file write error");
                        stats.record_warning();
                    }
                }
            }
            Block::EndOfFile { .. } => break,
            // The parser routes only this path's Data and EndOfFile here.
            other => {
                debug_assert!(false, "unexpected block kind {:?}", other.kind());
            }
        }
    }

    if let Some(writer) = out.take() {
        match writer.into_inner() {
            Ok(file) => drop(file),
            Err(e) => {
                warn!(path, error = %e.error(), "file flush error");
                stats.record_warning();
            }
        }
    }
    stats.record_file();
}
