//! Archive extraction pipeline
//!
//! A single-threaded parser reads framed blocks from a CRC64-hashing
//! reader, verifies the header and every checkpoint, creates directories
//! inline, and fans file block sequences out to one writer task per open
//! path:
//!
//! ```text
//!  input ──► ArchiveParser ──► per-path channels ──► FileWriter tasks ──► filesystem
//! ```
//!
//! Paths key the dispatch map because the wire format carries paths, not
//! ids; a path is inserted on StartOfFile and removed on EndOfFile.
//! Cross-path ordering in the stream is irrelevant to correctness, but
//! per-path ordering (Start, Data in file order, End) is what each writer
//! task relies on.

pub mod file_writer;

pub use file_writer::FileWriterHandle;

use crate::block::{Block, BlockKind, Ownership, ARCHIVE_HEADER};
use crate::config::ExtractConfig;
use crate::error::{ArchiveError, FormatError, Result};
use crate::fsmeta;
use byteorder::{BigEndian, ReadBytesExt};
use crc64fast::Digest;
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A reader tee that feeds every consumed byte into a CRC64-ECMA digest
///
/// Mirrors the create side: hashing everything read so far makes
/// checkpoint verification a plain compare at the right offset.
pub struct HashingReader<R: Read> {
    inner: R,
    digest: Digest,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            digest: Digest::new(),
        }
    }

    /// Running CRC64 of all bytes read so far
    pub fn sum64(&self) -> u64 {
        self.digest.sum64()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.digest.write(&buf[..n]);
        Ok(n)
    }
}

/// Statistics shared with the per-path writer tasks
#[derive(Debug, Default)]
pub struct ExtractStats {
    /// Paths fully processed (StartOfFile through EndOfFile)
    pub files_written: AtomicU64,

    /// File payload bytes handled
    pub bytes_written: AtomicU64,

    /// Directories created
    pub dirs_created: AtomicU64,

    /// Non-fatal errors encountered
    pub warnings: AtomicU64,
}

impl ExtractStats {
    pub(crate) fn record_file(&self) {
        self.files_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_dir(&self) {
        self.dirs_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_warning(&self) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
    }
}

/// Result of a completed extract run
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Files restored
    pub files: u64,

    /// Directories created
    pub dirs: u64,

    /// File payload bytes written
    pub bytes: u64,

    /// Non-fatal errors along the way
    pub warnings: u64,

    /// Wall-clock time for the run
    pub duration: Duration,
}

/// Restores a directory tree from an archive stream
pub struct Unarchiver {
    config: Arc<ExtractConfig>,
}

impl Unarchiver {
    /// Create a new unarchiver for the given configuration
    pub fn new(config: ExtractConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Read the archive from `input` and restore it under the current
    /// directory
    pub fn run<R: Read>(&self, input: R) -> Result<ExtractSummary> {
        let start = Instant::now();
        let mut reader = HashingReader::new(BufReader::new(input));

        let mut header = [0u8; 8];
        reader.read_exact(&mut header).map_err(map_truncated)?;
        if header != ARCHIVE_HEADER {
            return Err(FormatError::HeaderMismatch.into());
        }

        let stats = Arc::new(ExtractStats::default());
        let mut open_paths: HashMap<String, FileWriterHandle> = HashMap::new();
        let mut pending: Vec<JoinHandle<()>> = Vec::new();

        let outcome = self.read_blocks(&mut reader, &mut open_paths, &mut pending, &stats);

        // Close every channel still open and wait for all writer tasks,
        // on the error path too, before reporting anything.
        for (_, handle) in open_paths.drain() {
            pending.push(handle.finish());
        }
        for handle in pending.drain(..) {
            if handle.join().is_err() {
                warn!("file writer thread panicked");
            }
        }
        outcome?;

        let summary = ExtractSummary {
            files: stats.files_written.load(Ordering::Relaxed),
            dirs: stats.dirs_created.load(Ordering::Relaxed),
            bytes: stats.bytes_written.load(Ordering::Relaxed),
            warnings: stats.warnings.load(Ordering::Relaxed),
            duration: start.elapsed(),
        };
        info!(
            files = summary.files,
            dirs = summary.dirs,
            bytes = summary.bytes,
            duration_ms = summary.duration.as_millis() as u64,
            "archive extraction completed"
        );
        Ok(summary)
    }

    /// The frame loop; returns cleanly on EOF at a frame boundary
    fn read_blocks<R: Read>(
        &self,
        reader: &mut HashingReader<BufReader<R>>,
        open_paths: &mut HashMap<String, FileWriterHandle>,
        pending: &mut Vec<JoinHandle<()>>,
        stats: &Arc<ExtractStats>,
    ) -> Result<()> {
        loop {
            let path_len = match read_frame_start(reader)? {
                Some(len) => len,
                None => return Ok(()),
            };

            let mut path_bytes = vec![0u8; path_len as usize];
            reader.read_exact(&mut path_bytes).map_err(map_truncated)?;
            let path = String::from_utf8(path_bytes).map_err(|_| FormatError::InvalidPath)?;
            if path.starts_with('/') {
                return Err(FormatError::AbsolutePath { path }.into());
            }

            let tag = reader.read_u8().map_err(map_truncated)?;
            let kind =
                BlockKind::from_tag(tag).ok_or(FormatError::UnrecognizedBlockType { tag })?;

            match kind {
                BlockKind::StartOfFile => {
                    let meta = read_ownership(reader)?;
                    if open_paths.contains_key(&path) {
                        return Err(FormatError::DuplicateStart { path }.into());
                    }
                    let handle = FileWriterHandle::spawn(
                        path.clone(),
                        meta,
                        Arc::clone(&self.config),
                        Arc::clone(stats),
                    )?;
                    open_paths.insert(path, handle);
                }
                BlockKind::Data => {
                    let size = reader.read_u16::<BigEndian>().map_err(map_truncated)?;
                    let mut payload = vec![0u8; size as usize];
                    reader.read_exact(&mut payload).map_err(map_truncated)?;
                    let writer = open_paths
                        .get(&path)
                        .ok_or(FormatError::UnknownPath { path: path.clone() })?;
                    writer.send(Block::Data {
                        path,
                        payload,
                    });
                }
                BlockKind::EndOfFile => {
                    let writer = open_paths
                        .remove(&path)
                        .ok_or(FormatError::UnknownPath { path: path.clone() })?;
                    writer.send(Block::EndOfFile { path });
                    pending.push(writer.finish());
                    reap_finished(pending);
                }
                BlockKind::Directory => {
                    let meta = read_ownership(reader)?;
                    self.create_directory(&path, &meta, stats);
                }
                BlockKind::Checksum => {
                    // Snapshot before consuming the stored value: the value
                    // field is not part of its own sum (but feeds later ones
                    // through the tee).
                    let computed = reader.sum64();
                    let stored = reader.read_u64::<BigEndian>().map_err(map_truncated)?;
                    if stored != computed {
                        return Err(FormatError::CrcMismatch { stored, computed }.into());
                    }
                }
            }
        }
    }

    fn create_directory(&self, path: &str, meta: &Ownership, stats: &ExtractStats) {
        debug!(path, "creating directory");
        if self.config.dry_run {
            stats.record_dir();
            return;
        }

        // create_dir_all: a multi-component seed root legitimately shows up
        // before its parents exist, and an already-present directory is a
        // no-op either way.
        if let Err(e) = fs::create_dir_all(path) {
            warn!(path, error = %e, "directory create error");
            stats.record_warning();
            return;
        }

        let mode = if self.config.ignore_perms {
            fsmeta::DEFAULT_DIR_MODE
        } else {
            meta.mode
        };
        fsmeta::restore_dir_mode(Path::new(path), mode);
        if !self.config.ignore_owners {
            fsmeta::restore_dir_owner(Path::new(path), meta);
        }
        stats.record_dir();
    }
}

/// Read the u16 path length that starts a frame
///
/// EOF before the first byte is the stream's clean termination; EOF after
/// it is a truncated frame.
fn read_frame_start<R: Read>(reader: &mut HashingReader<R>) -> Result<Option<u16>> {
    let mut first = [0u8; 1];
    loop {
        match reader.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let mut second = [0u8; 1];
    reader.read_exact(&mut second).map_err(map_truncated)?;
    Ok(Some(u16::from_be_bytes([first[0], second[0]])))
}

fn read_ownership<R: Read>(reader: &mut R) -> Result<Ownership> {
    let uid = reader.read_u32::<BigEndian>().map_err(map_truncated)?;
    let gid = reader.read_u32::<BigEndian>().map_err(map_truncated)?;
    let mode = reader.read_u32::<BigEndian>().map_err(map_truncated)?;
    Ok(Ownership { uid, gid, mode })
}

/// Join writer tasks that have already finished, without blocking
fn reap_finished(pending: &mut Vec<JoinHandle<()>>) {
    let mut i = 0;
    while i < pending.len() {
        if pending[i].is_finished() {
            if pending.swap_remove(i).join().is_err() {
                warn!("file writer thread panicked");
            }
        } else {
            i += 1;
        }
    }
}

fn map_truncated(e: io::Error) -> ArchiveError {
    if e.kind() == ErrorKind::UnexpectedEof {
        FormatError::Truncated.into()
    } else {
        e.into()
    }
}
