//! Filesystem metadata capture and restoration
//!
//! Ownership comes from platform-specific stat fields; on platforms
//! without uid/gid the archived values default to zero and restoration is
//! a no-op. Restoration failures are warnings: the file contents are
//! already in place and a missing chown must not abort the run.

use crate::block::Ownership;
use std::fs::{File, Metadata};
use std::path::Path;
use tracing::warn;

/// Permission bits preserved in the archive
pub const MODE_MASK: u32 = 0o7777;

/// Directory mode applied when permission restoration is disabled
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Capture uid/gid/mode from a stat result
#[cfg(unix)]
pub fn ownership_of(meta: &Metadata) -> Ownership {
    use std::os::unix::fs::MetadataExt;
    Ownership {
        uid: meta.uid(),
        gid: meta.gid(),
        mode: meta.mode() & MODE_MASK,
    }
}

/// Capture uid/gid/mode from a stat result
///
/// No portable uid/gid exists here; extractors treat zero as unknown.
#[cfg(not(unix))]
pub fn ownership_of(meta: &Metadata) -> Ownership {
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    Ownership { uid: 0, gid: 0, mode }
}

/// Restore ownership on an open file handle
#[cfg(unix)]
pub fn restore_file_owner(file: &File, path: &str, meta: &Ownership) {
    use std::os::unix::fs::fchown;
    if let Err(e) = fchown(file, Some(meta.uid), Some(meta.gid)) {
        warn!(path, uid = meta.uid, gid = meta.gid, error = %e, "unable to chown file");
    }
}

#[cfg(not(unix))]
pub fn restore_file_owner(_file: &File, _path: &str, _meta: &Ownership) {}

/// Restore ownership on a directory
#[cfg(unix)]
pub fn restore_dir_owner(path: &Path, meta: &Ownership) {
    use std::os::unix::fs::chown;
    if let Err(e) = chown(path, Some(meta.uid), Some(meta.gid)) {
        warn!(path = %path.display(), uid = meta.uid, gid = meta.gid, error = %e,
            "unable to chown directory");
    }
}

#[cfg(not(unix))]
pub fn restore_dir_owner(_path: &Path, _meta: &Ownership) {}

/// Restore permission bits on an open file handle
#[cfg(unix)]
pub fn restore_file_mode(file: &File, path: &str, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode & MODE_MASK);
    if let Err(e) = file.set_permissions(perms) {
        warn!(path, mode = format_args!("{:o}", mode), error = %e, "unable to chmod file");
    }
}

#[cfg(not(unix))]
pub fn restore_file_mode(_file: &File, _path: &str, _mode: u32) {}

/// Restore permission bits on a directory
#[cfg(unix)]
pub fn restore_dir_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode & MODE_MASK);
    if let Err(e) = std::fs::set_permissions(path, perms) {
        warn!(path = %path.display(), mode = format_args!("{:o}", mode), error = %e,
            "unable to chmod directory");
    }
}

#[cfg(not(unix))]
pub fn restore_dir_mode(_path: &Path, _mode: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_masks_file_type_bits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        let owner = ownership_of(&meta);
        // S_IFREG and friends must not leak into the archived mode
        assert_eq!(owner.mode & !MODE_MASK, 0);
    }

    #[test]
    fn test_restore_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let file = File::create(&path).unwrap();
        restore_file_mode(&file, "f", 0o640);
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & MODE_MASK, 0o640);
    }
}
