//! Configuration types for fastar
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Validated runtime configuration for both pipeline directions
//! - Exclude pattern compilation

use crate::block::MAX_PAYLOAD;
use crate::error::ConfigError;
use clap::Parser;
use glob::Pattern;
use std::ffi::OsString;
use std::path::PathBuf;

/// Maximum reasonable worker pool size
const MAX_WORKERS: usize = 512;

/// Minimum queue capacity
const MIN_QUEUE_SIZE: usize = 1;

/// Default Data block size in bytes
pub const DEFAULT_BLOCK_SIZE: u16 = 4096;

/// Default directory reader / file reader pool sizes
pub const DEFAULT_READERS: usize = 16;

/// Default capacity for all three pipeline queues
pub const DEFAULT_QUEUE_SIZE: usize = 128;

/// Fast streaming archiver for trees of many small files
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fastar",
    version,
    about = "Streaming concurrent archiver for trees of many small files",
    long_about = "Packs filesystem subtrees into a single byte stream and restores them.\n\n\
                  Directory traversal and file reading overlap across worker pools, so\n\
                  archive emission begins before the tree has been fully enumerated.",
    after_help = "EXAMPLES:\n    \
        fastar -c photos logs -o backup.fa\n    \
        fastar -c src | ssh host fastar -x\n    \
        fastar -c data --exclude '*.tmp:*.pid' -o data.fa\n    \
        fastar -x -i backup.fa --ignore-owners"
)]
pub struct CliArgs {
    /// Create an archive from the given directories
    #[arg(short = 'c')]
    pub create: bool,

    /// Extract an archive
    #[arg(short = 'x')]
    pub extract: bool,

    /// Output file for creation; defaults to standard output (-c only)
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Input file for extraction; defaults to standard input (-x only)
    #[arg(short = 'i', value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Internal block size in bytes, 1-65535 (-c only)
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE as usize, value_name = "N")]
    pub block_size: usize,

    /// Number of simultaneous directory readers (-c only)
    #[arg(long, default_value_t = DEFAULT_READERS, value_name = "N")]
    pub dir_readers: usize,

    /// Number of simultaneous file readers (-c only)
    #[arg(long, default_value_t = DEFAULT_READERS, value_name = "N")]
    pub file_readers: usize,

    /// Queue size for scanning directories (-c only)
    #[arg(long = "queue-dir", default_value_t = DEFAULT_QUEUE_SIZE, value_name = "N")]
    pub queue_dir: usize,

    /// Queue size for reading files (-c only)
    #[arg(long = "queue-read", default_value_t = DEFAULT_QUEUE_SIZE, value_name = "N")]
    pub queue_read: usize,

    /// Queue size for archive write (-c only); increasing can cause
    /// increased memory usage
    #[arg(long = "queue-write", default_value_t = DEFAULT_QUEUE_SIZE, value_name = "N")]
    pub queue_write: usize,

    /// Maximum number of CPUs that can be executing simultaneously
    #[arg(long, default_value_t = 1, value_name = "N")]
    pub multicpu: usize,

    /// Glob patterns separated by the OS path-list separator; entries whose
    /// full path matches any pattern are not archived (-c only)
    #[arg(long, value_name = "LIST")]
    pub exclude: Option<String>,

    /// Verbose output on standard error
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Do not restore permissions (-x only); directories fall back to 0755
    #[arg(long)]
    pub ignore_perms: bool,

    /// Do not restore ownership (-x only)
    #[arg(long)]
    pub ignore_owners: bool,

    /// Directories to archive (-c only)
    #[arg(value_name = "DIR")]
    pub dirs: Vec<PathBuf>,
}

/// The validated run mode with its configuration
#[derive(Debug, Clone)]
pub enum RunMode {
    Create(CreateConfig),
    Extract(ExtractConfig),
}

impl RunMode {
    /// Validate CLI arguments into a runnable configuration
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        match (args.create, args.extract) {
            (true, false) => Ok(RunMode::Create(CreateConfig::from_args(args)?)),
            (false, true) => Ok(RunMode::Extract(ExtractConfig::from_args(args))),
            _ => Err(ConfigError::ModeRequired),
        }
    }
}

/// Validated configuration for archive creation
#[derive(Debug, Clone)]
pub struct CreateConfig {
    /// Seed directories to archive
    pub roots: Vec<PathBuf>,

    /// Output archive path; `None` streams to standard output
    pub output: Option<PathBuf>,

    /// Data block size in bytes
    pub block_size: u16,

    /// DirectoryScanner pool size
    pub dir_readers: usize,

    /// FileReader pool size
    pub file_readers: usize,

    /// Capacity of the directory scan queue (soft; see ScanQueue)
    pub scan_queue_size: usize,

    /// Capacity of the file read queue
    pub read_queue_size: usize,

    /// Capacity of the block queue; bounds in-flight payload memory at
    /// roughly `block_queue_size * block_size` bytes
    pub block_queue_size: usize,

    /// Parallelism hint; advisory under OS threads
    pub multicpu: usize,

    /// Compiled exclude patterns
    pub exclude: Vec<Pattern>,

    /// Verbose logging enabled
    pub verbose: bool,
}

impl CreateConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.dirs.is_empty() {
            return Err(ConfigError::NoInputDirectories);
        }

        if args.block_size == 0 || args.block_size > MAX_PAYLOAD {
            return Err(ConfigError::InvalidBlockSize {
                size: args.block_size,
                max: MAX_PAYLOAD,
            });
        }

        for count in [args.dir_readers, args.file_readers] {
            if count == 0 || count > MAX_WORKERS {
                return Err(ConfigError::InvalidWorkerCount {
                    count,
                    max: MAX_WORKERS,
                });
            }
        }

        for size in [args.queue_dir, args.queue_read, args.queue_write] {
            if size < MIN_QUEUE_SIZE {
                return Err(ConfigError::InvalidQueueSize {
                    size,
                    min: MIN_QUEUE_SIZE,
                });
            }
        }

        if args.multicpu == 0 {
            return Err(ConfigError::InvalidMultiCpu { value: args.multicpu });
        }

        let exclude = match &args.exclude {
            Some(list) => compile_exclude_list(list)?,
            None => Vec::new(),
        };

        Ok(Self {
            roots: args.dirs,
            output: args.output,
            block_size: args.block_size as u16,
            dir_readers: args.dir_readers,
            file_readers: args.file_readers,
            scan_queue_size: args.queue_dir,
            read_queue_size: args.queue_read,
            block_queue_size: args.queue_write,
            multicpu: args.multicpu,
            exclude,
            verbose: args.verbose,
        })
    }

    /// Check whether a full child path matches any exclude pattern
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(path))
    }
}

impl Default for CreateConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            output: None,
            block_size: DEFAULT_BLOCK_SIZE,
            dir_readers: DEFAULT_READERS,
            file_readers: DEFAULT_READERS,
            scan_queue_size: DEFAULT_QUEUE_SIZE,
            read_queue_size: DEFAULT_QUEUE_SIZE,
            block_queue_size: DEFAULT_QUEUE_SIZE,
            multicpu: 1,
            exclude: Vec::new(),
            verbose: false,
        }
    }
}

/// Validated configuration for archive extraction
#[derive(Debug, Clone, Default)]
pub struct ExtractConfig {
    /// Input archive path; `None` streams from standard input
    pub input: Option<PathBuf>,

    /// Skip permission restoration; directories fall back to 0755
    pub ignore_perms: bool,

    /// Skip ownership restoration
    pub ignore_owners: bool,

    /// Verify structure and checksums without touching the filesystem
    pub dry_run: bool,

    /// Verbose logging enabled
    pub verbose: bool,
}

impl ExtractConfig {
    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            input: args.input,
            ignore_perms: args.ignore_perms,
            ignore_owners: args.ignore_owners,
            dry_run: false,
            verbose: args.verbose,
        }
    }
}

/// Split a path-list string into glob patterns and compile them
fn compile_exclude_list(list: &str) -> Result<Vec<Pattern>, ConfigError> {
    std::env::split_paths(&OsString::from(list))
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| {
            let text = p.to_string_lossy();
            Pattern::new(&text).map_err(|e| ConfigError::InvalidExcludePattern {
                pattern: text.into_owned(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["fastar", "-c", "some-dir"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_mode_required() {
        let args = CliArgs::parse_from(["fastar"]);
        assert!(matches!(
            RunMode::from_args(args),
            Err(ConfigError::ModeRequired)
        ));

        let args = CliArgs::parse_from(["fastar", "-c", "-x", "d"]);
        assert!(matches!(
            RunMode::from_args(args),
            Err(ConfigError::ModeRequired)
        ));
    }

    #[test]
    fn test_create_requires_directories() {
        let args = CliArgs::parse_from(["fastar", "-c"]);
        assert!(matches!(
            RunMode::from_args(args),
            Err(ConfigError::NoInputDirectories)
        ));
    }

    #[test]
    fn test_block_size_bounds() {
        let config = CreateConfig::from_args(create_args(&["--block-size", "65535"])).unwrap();
        assert_eq!(config.block_size, 65535);

        assert!(matches!(
            CreateConfig::from_args(create_args(&["--block-size", "0"])),
            Err(ConfigError::InvalidBlockSize { .. })
        ));
        assert!(matches!(
            CreateConfig::from_args(create_args(&["--block-size", "65536"])),
            Err(ConfigError::InvalidBlockSize { .. })
        ));
    }

    #[test]
    fn test_worker_count_bounds() {
        assert!(matches!(
            CreateConfig::from_args(create_args(&["--dir-readers", "0"])),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
        assert!(matches!(
            CreateConfig::from_args(create_args(&["--file-readers", "1000"])),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_exclude_patterns_match_full_child_path() {
        let config = CreateConfig::from_args(create_args(&["--exclude", "*.pid"])).unwrap();
        assert!(config.is_excluded("a/c.pid"));
        assert!(!config.is_excluded("a/b"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exclude_list_is_colon_separated() {
        let config =
            CreateConfig::from_args(create_args(&["--exclude", "*.tmp:*/cache/*"])).unwrap();
        assert_eq!(config.exclude.len(), 2);
        assert!(config.is_excluded("build/x.tmp"));
        assert!(config.is_excluded("home/cache/obj"));
        assert!(!config.is_excluded("src/main.rs"));
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        assert!(matches!(
            CreateConfig::from_args(create_args(&["--exclude", "a[bad"])),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));
    }
}
