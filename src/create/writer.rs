//! Archive writer: the single consumer of the block queue
//!
//! The writer serializes interleaved block traffic into the output stream.
//! Everything it emits passes through a CRC64-ECMA tee; every 1000 blocks
//! it interleaves a checkpoint frame carrying the running sum, and a final
//! checkpoint closes the stream. The sum for a checkpoint is taken after
//! that checkpoint's own path-length and tag bytes have been hashed but
//! before its value field, which is exactly what a verifying reader
//! observes at that offset.

use crate::block::{Block, BlockKind, ARCHIVE_HEADER, CHECKSUM_INTERVAL};
use crate::create::FailureSlot;
use crate::error::WorkerError;
use byteorder::{BigEndian, WriteBytesExt};
use crc64fast::Digest;
use crossbeam_channel::Receiver;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// A writer tee that feeds every outgoing byte into a CRC64-ECMA digest
pub struct HashingWriter<W: Write> {
    inner: W,
    digest: Digest,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: Digest::new(),
            bytes: 0,
        }
    }

    /// Running CRC64 of all bytes written so far
    pub fn sum64(&self) -> u64 {
        self.digest.sum64()
    }

    /// Total bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.write(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Serializes blocks into the framed archive stream
pub struct ArchiveWriter<W: Write> {
    out: HashingWriter<BufWriter<W>>,
    blocks: u64,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(output: W) -> Self {
        Self {
            out: HashingWriter::new(BufWriter::new(output)),
            blocks: 0,
        }
    }

    /// Write the 8-byte archive header
    pub fn write_header(&mut self) -> io::Result<()> {
        self.out.write_all(&ARCHIVE_HEADER)
    }

    /// Write one block frame, interleaving a checkpoint every
    /// [`CHECKSUM_INTERVAL`] blocks
    pub fn write_block(&mut self, block: &Block) -> io::Result<()> {
        block.encode(&mut self.out)?;
        self.blocks += 1;
        if self.blocks % CHECKSUM_INTERVAL == 0 {
            self.write_checksum()?;
        }
        Ok(())
    }

    /// Emit a checkpoint frame
    ///
    /// The sum is snapshotted after the frame's zero path-length and tag
    /// have gone through the tee; the value field itself is hashed too and
    /// so becomes part of every later checkpoint.
    fn write_checksum(&mut self) -> io::Result<()> {
        self.out.write_u16::<BigEndian>(0)?;
        self.out.write_u8(BlockKind::Checksum.tag())?;
        let sum = self.out.sum64();
        self.out.write_u64::<BigEndian>(sum)
    }

    /// Blocks written so far (checkpoints not counted)
    pub fn blocks_written(&self) -> u64 {
        self.blocks
    }

    /// Write the final checkpoint and flush; returns total bytes emitted
    pub fn finish(mut self) -> io::Result<u64> {
        self.write_checksum()?;
        self.out.flush()?;
        Ok(self.out.bytes_written())
    }
}

/// Statistics about archive output
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Queue blocks written (checkpoints excluded)
    pub blocks_written: AtomicU64,

    /// Total archive bytes emitted, header and checkpoints included
    pub bytes_written: AtomicU64,
}

/// The dedicated archive writer thread
pub struct ArchiveWriterTask {
    handle: Option<JoinHandle<()>>,
    stats: Arc<WriterStats>,
}

impl ArchiveWriterTask {
    /// Spawn the writer thread over the block queue
    ///
    /// A write failure is fatal to the run: it is recorded in the failure
    /// slot and the shutdown flag is raised so producers stop.
    pub fn spawn<W: Write + Send + 'static>(
        output: W,
        block_rx: Receiver<Block>,
        failure: Arc<FailureSlot>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WriterStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("archive-writer".into())
            .spawn(move || {
                if let Err(e) = writer_loop(output, block_rx, &stats_clone) {
                    error!(error = %e, "archive write error");
                    failure.record(e.into());
                    shutdown.store(true, Ordering::SeqCst);
                }
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "archive writer",
                reason: e.to_string(),
            })?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    /// The writer's statistics; valid to read after [`join`](Self::join)
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the writer to drain and finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WorkerError::Panicked {
                name: "archive writer",
            })?;
        }
        Ok(())
    }
}

fn writer_loop<W: Write>(
    output: W,
    block_rx: Receiver<Block>,
    stats: &WriterStats,
) -> io::Result<()> {
    let mut writer = ArchiveWriter::new(output);
    writer.write_header()?;

    for block in block_rx.iter() {
        writer.write_block(&block)?;
        stats.blocks_written.fetch_add(1, Ordering::Relaxed);
    }

    let bytes = writer.finish()?;
    stats.bytes_written.store(bytes, Ordering::Relaxed);
    debug!(bytes, "archive stream finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Ownership;
    use byteorder::ReadBytesExt;
    use std::io::Read;

    /// Walk the frames of an encoded stream, returning (kind, path) pairs
    fn walk_frames(mut data: &[u8]) -> Vec<(BlockKind, String)> {
        let mut frames = Vec::new();
        loop {
            let len = match data.read_u16::<BigEndian>() {
                Ok(len) => len,
                Err(_) => break,
            };
            let mut path = vec![0u8; len as usize];
            data.read_exact(&mut path).unwrap();
            let kind = BlockKind::from_tag(data.read_u8().unwrap()).unwrap();
            match kind {
                BlockKind::Data => {
                    let n = data.read_u16::<BigEndian>().unwrap();
                    let mut payload = vec![0u8; n as usize];
                    data.read_exact(&mut payload).unwrap();
                }
                BlockKind::StartOfFile | BlockKind::Directory => {
                    let mut meta = [0u8; 12];
                    data.read_exact(&mut meta).unwrap();
                }
                BlockKind::EndOfFile => {}
                BlockKind::Checksum => {
                    data.read_u64::<BigEndian>().unwrap();
                }
            }
            frames.push((kind, String::from_utf8(path).unwrap()));
        }
        frames
    }

    #[test]
    fn test_empty_stream_is_header_plus_final_checksum() {
        let mut buf = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buf);
        writer.write_header().unwrap();
        writer.finish().unwrap();

        assert_eq!(&buf[..8], &ARCHIVE_HEADER);
        // checkpoint frame: zero path length, tag, u64 value
        assert_eq!(&buf[8..11], &[0x00, 0x00, 0x04]);
        assert_eq!(buf.len(), 19);

        // The stored value is the CRC64 of everything before it.
        let mut digest = Digest::new();
        digest.write(&buf[..11]);
        let stored = u64::from_be_bytes(buf[11..19].try_into().unwrap());
        assert_eq!(stored, digest.sum64());
    }

    #[test]
    fn test_checkpoint_interleaved_every_thousand_blocks() {
        let mut buf = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buf);
        writer.write_header().unwrap();
        for i in 0..1200 {
            writer
                .write_block(&Block::Directory {
                    path: format!("d{}", i),
                    meta: Ownership::default(),
                })
                .unwrap();
        }
        writer.finish().unwrap();

        let frames = walk_frames(&buf[8..]);
        let checksums: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, (kind, _))| *kind == BlockKind::Checksum)
            .map(|(i, _)| i)
            .collect();
        // One checkpoint after block 1000, one final.
        assert_eq!(checksums, vec![1000, 1201]);
    }

    #[test]
    fn test_intermediate_checkpoints_feed_later_ones() {
        let mut buf = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buf);
        writer.write_header().unwrap();
        for i in 0..2000 {
            writer
                .write_block(&Block::EndOfFile {
                    path: format!("f{}", i),
                })
                .unwrap();
        }
        writer.finish().unwrap();

        // Re-hash the stream from the start; at every checkpoint frame the
        // stored value must equal the digest of all preceding bytes,
        // including earlier checkpoints' value fields.
        let mut digest = Digest::new();
        let mut pos = 0usize;
        let mut verified = 0;
        digest.write(&buf[..8]);
        pos += 8;
        while pos < buf.len() {
            let len = u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
            let tag = buf[pos + 2 + len];
            if len == 0 && tag == BlockKind::Checksum.tag() {
                digest.write(&buf[pos..pos + 3]);
                let stored = u64::from_be_bytes(buf[pos + 3..pos + 11].try_into().unwrap());
                assert_eq!(stored, digest.sum64());
                digest.write(&buf[pos + 3..pos + 11]);
                pos += 11;
                verified += 1;
            } else {
                // EndOfFile frames only in this stream
                let frame = 2 + len + 1;
                digest.write(&buf[pos..pos + frame]);
                pos += frame;
            }
        }
        assert_eq!(verified, 3);
    }
}
