//! fastar - Streaming Concurrent Archiver
//!
//! Packs a filesystem subtree into a single byte stream and restores it
//! back to a directory tree. Built for workloads of millions of small
//! files, where the wall-clock cost of sequential open/stat/read/close
//! dominates: directory traversal overlaps with file reading across
//! worker pools, and archive emission begins before the traversal
//! inventory is known.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │              create pipeline                 │
//!                    │                                              │
//!   seed dirs ───────│──► DirScanQueue ◄──┐ (subdirs)               │
//!                    │        │           │                         │
//!                    │        ▼           │                         │
//!                    │  DirectoryScanner pool ───► FileReadQueue    │
//!                    │        │                         │           │
//!                    │        │ Directory blocks        ▼           │
//!                    │        │                  FileReader pool    │
//!                    │        │                         │           │
//!                    │        ▼                         ▼           │
//!                    │       BlockQueue  ◄── Start/Data*/End blocks │
//!                    │            │                                 │
//!                    │            ▼                                 │
//!                    │      ArchiveWriter (CRC64 tee, checkpoints)  │
//!                    └────────────│─────────────────────────────────┘
//!                                 ▼
//!                          archive stream
//!                                 │
//!                    ┌────────────▼─────────────────────────────────┐
//!                    │            extract pipeline                  │
//!                    │                                              │
//!                    │  ArchiveParser (CRC64 tee, verify)           │
//!                    │        │ per-path channels                   │
//!                    │        ▼                                     │
//!                    │  FileWriter task per open path               │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! The archive is strictly streamable: framed blocks after an 8-byte
//! header, big-endian integers, periodic CRC64-ECMA checkpoints over the
//! raw encoded byte stream. Blocks for different paths may interleave
//! freely; per-path order is what extraction relies on.
//!
//! # Example
//!
//! ```bash
//! # Archive two trees to a file
//! fastar -c photos logs -o backup.fa
//!
//! # Stream across a pipe and restore elsewhere
//! fastar -c src | ssh host fastar -x
//! ```

pub mod block;
pub mod config;
pub mod create;
pub mod error;
pub mod extract;
pub mod fsmeta;
pub mod progress;

pub use block::{Block, BlockKind, Ownership, ARCHIVE_HEADER};
pub use config::{CliArgs, CreateConfig, ExtractConfig, RunMode};
pub use create::{Archiver, CreateSummary};
pub use error::{ArchiveError, FormatError, Result};
pub use extract::{ExtractSummary, Unarchiver};
