//! Archive block model and frame encoding
//!
//! Every record in the archive stream is a framed block: a big-endian u16
//! path length, the UTF-8 path bytes, a one-byte kind tag, then a
//! kind-specific tail. The stream is self-delimiting; there is no global
//! index and blocks for different paths may interleave freely.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

/// Archive header: the PNG header trick with 'PNG' replaced by 'FA1' to
/// identify the fast-archive format (version 1).
pub const ARCHIVE_HEADER: [u8; 8] = [0x89, b'F', b'A', b'1', 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest payload a Data frame can carry (u16 size field)
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Largest path a frame can carry (u16 length field)
pub const MAX_PATH_BYTES: usize = u16::MAX as usize;

/// A checksum block is interleaved after this many queue blocks
pub const CHECKSUM_INTERVAL: u64 = 1000;

/// Block kind tags as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    Data = 0,
    StartOfFile = 1,
    EndOfFile = 2,
    Directory = 3,
    Checksum = 4,
}

impl BlockKind {
    /// Wire tag for this kind
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a wire tag; `None` for unknown tags
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BlockKind::Data),
            1 => Some(BlockKind::StartOfFile),
            2 => Some(BlockKind::EndOfFile),
            3 => Some(BlockKind::Directory),
            4 => Some(BlockKind::Checksum),
            _ => None,
        }
    }
}

/// Ownership and permission metadata carried by StartOfFile and Directory
/// blocks
///
/// `mode` holds the Unix permission bits (`st_mode & 0o7777`); whether the
/// entry is a directory is conveyed by the block kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// One framed record of the archive stream
///
/// Data payloads own their buffer: blocks for many files are in flight on
/// the block queue concurrently, so each carries a distinct allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// A run of file bytes, in file order per path
    Data { path: String, payload: Vec<u8> },

    /// Opens a path; carries the file's ownership and mode
    StartOfFile { path: String, meta: Ownership },

    /// Closes a path
    EndOfFile { path: String },

    /// A directory, emitted before any block under it
    Directory { path: String, meta: Ownership },

    /// Running CRC64 checkpoint (path length zero on the wire)
    Checksum { sum: u64 },
}

impl Block {
    /// The wire kind of this block
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Data { .. } => BlockKind::Data,
            Block::StartOfFile { .. } => BlockKind::StartOfFile,
            Block::EndOfFile { .. } => BlockKind::EndOfFile,
            Block::Directory { .. } => BlockKind::Directory,
            Block::Checksum { .. } => BlockKind::Checksum,
        }
    }

    /// The path this block belongs to; empty for Checksum
    pub fn path(&self) -> &str {
        match self {
            Block::Data { path, .. }
            | Block::StartOfFile { path, .. }
            | Block::EndOfFile { path }
            | Block::Directory { path, .. } => path,
            Block::Checksum { .. } => "",
        }
    }

    /// Encode one frame: u16 path length, path bytes, kind tag, tail
    ///
    /// Callers must keep paths within [`MAX_PATH_BYTES`] and payloads
    /// within [`MAX_PAYLOAD`]; the scanner and reader enforce both before
    /// a block is ever constructed.
    pub fn encode<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let path = self.path().as_bytes();
        debug_assert!(path.len() <= MAX_PATH_BYTES);
        out.write_u16::<BigEndian>(path.len() as u16)?;
        out.write_all(path)?;
        out.write_u8(self.kind().tag())?;

        match self {
            Block::Data { payload, .. } => {
                debug_assert!(payload.len() <= MAX_PAYLOAD);
                out.write_u16::<BigEndian>(payload.len() as u16)?;
                out.write_all(payload)?;
            }
            Block::StartOfFile { meta, .. } | Block::Directory { meta, .. } => {
                out.write_u32::<BigEndian>(meta.uid)?;
                out.write_u32::<BigEndian>(meta.gid)?;
                out.write_u32::<BigEndian>(meta.mode)?;
            }
            Block::EndOfFile { .. } => {}
            Block::Checksum { sum } => {
                out.write_u64::<BigEndian>(*sum)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_round_trip() {
        for kind in [
            BlockKind::Data,
            BlockKind::StartOfFile,
            BlockKind::EndOfFile,
            BlockKind::Directory,
            BlockKind::Checksum,
        ] {
            assert_eq!(BlockKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(BlockKind::from_tag(5), None);
        assert_eq!(BlockKind::from_tag(255), None);
    }

    #[test]
    fn test_encode_data_block() {
        let block = Block::Data {
            path: "a/b".into(),
            payload: b"hi".to_vec(),
        };
        let mut buf = Vec::new();
        block.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0x00, 0x03, // path length
                b'a', b'/', b'b', // path
                0x00, // kind tag: Data
                0x00, 0x02, // payload size
                b'h', b'i', // payload
            ]
        );
    }

    #[test]
    fn test_encode_start_of_file() {
        let block = Block::StartOfFile {
            path: "f".into(),
            meta: Ownership {
                uid: 1000,
                gid: 100,
                mode: 0o644,
            },
        };
        let mut buf = Vec::new();
        block.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0x00, 0x01, b'f', 0x01, // length, path, tag
                0x00, 0x00, 0x03, 0xE8, // uid 1000
                0x00, 0x00, 0x00, 0x64, // gid 100
                0x00, 0x00, 0x01, 0xA4, // mode 0o644
            ]
        );
    }

    #[test]
    fn test_encode_end_of_file_has_no_tail() {
        let block = Block::EndOfFile { path: "f".into() };
        let mut buf = Vec::new();
        block.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x01, b'f', 0x02]);
    }

    #[test]
    fn test_encode_checksum_has_empty_path() {
        let block = Block::Checksum { sum: 0x0102030405060708 };
        let mut buf = Vec::new();
        block.encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            [0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_empty_data_block_is_legal() {
        let block = Block::Data {
            path: "f".into(),
            payload: Vec::new(),
        };
        let mut buf = Vec::new();
        block.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x01, b'f', 0x00, 0x00, 0x00]);
    }
}
