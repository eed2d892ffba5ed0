//! Error types for fastar
//!
//! Two classes of failure exist in the pipeline:
//! - Fatal errors (format violations, configuration errors, a dead worker)
//!   abort the run and surface through these types.
//! - Per-unit I/O failures (an unreadable file, a failed chown) are logged
//!   as warnings and the worker moves on to the next unit; they never
//!   appear here.

use thiserror::Error;

/// Top-level error type for the fastar application
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Archive stream format violations
    #[error("archive format error: {0}")]
    Format(#[from] FormatError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker thread errors
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors on the archive stream itself
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Violations of the archive stream format
///
/// All of these are fatal: the stream cannot be trusted past the point
/// where one is detected.
#[derive(Error, Debug)]
pub enum FormatError {
    /// A path in the input arguments or the archive begins with a separator
    #[error("unable to process archive with absolute path reference: '{path}'")]
    AbsolutePath { path: String },

    /// The first 8 bytes of the input do not match the archive magic
    #[error("unexpected file header")]
    HeaderMismatch,

    /// A stored checksum does not match the running CRC64
    #[error("crc64 mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    CrcMismatch { stored: u64, computed: u64 },

    /// Unknown block kind tag
    #[error("unrecognized block type {tag}")]
    UnrecognizedBlockType { tag: u8 },

    /// Data or end-of-file block for a path with no open start-of-file
    #[error("block for path '{path}' without a preceding start-of-file")]
    UnknownPath { path: String },

    /// Second start-of-file for a path that is still open
    #[error("duplicate start-of-file for path '{path}'")]
    DuplicateStart { path: String },

    /// EOF in the middle of a frame
    #[error("archive truncated mid-frame")]
    Truncated,

    /// Block path is not valid UTF-8
    #[error("block path is not valid UTF-8")]
    InvalidPath,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither or both of -c / -x given
    #[error("exactly one of create (-c) or extract (-x) must be provided")]
    ModeRequired,

    /// Create mode without directory arguments
    #[error("directories to archive must be specified")]
    NoInputDirectories,

    /// Block size outside the u16 frame field
    #[error("invalid block size {size}: must be between 1 and {max}")]
    InvalidBlockSize { size: usize, max: usize },

    /// Invalid worker pool size
    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid queue capacity
    #[error("invalid queue size {size}: must be at least {min}")]
    InvalidQueueSize { size: usize, min: usize },

    /// Invalid parallelism hint
    #[error("invalid multicpu value {value}: must be at least 1")]
    InvalidMultiCpu { value: usize },

    /// Exclude pattern failed to compile
    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("{name} thread panicked")]
    Panicked { name: &'static str },

    /// Worker failed to start
    #[error("failed to spawn {name} thread: {reason}")]
    SpawnFailed { name: &'static str, reason: String },
}

/// Result type alias for ArchiveError
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_conversion() {
        let fmt_err = FormatError::HeaderMismatch;
        let err: ArchiveError = fmt_err.into();
        assert!(matches!(err, ArchiveError::Format(_)));
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = FormatError::CrcMismatch {
            stored: 0x1234,
            computed: 0x5678,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x0000000000001234"));
        assert!(msg.contains("0x0000000000005678"));
    }
}
