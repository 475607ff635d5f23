//! Directory lifecycle and version discovery over the `<name>-<version>`
//! naming convention.

use crate::models::{CheckpointIdentity, Result, Status, TierError};
use nix::unistd::{access, AccessFlags};
use std::fs::{self, DirBuilder};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// Permission bits for every directory this crate creates.
pub const DIR_MODE: u32 = 0o755;

/// Make sure `path` exists as a listable directory.
///
/// An existing directory is not an error. Returns `false` only when the
/// directory cannot be listed afterwards.
pub fn ensure_directory(path: &Path) -> bool {
    if let Err(e) = DirBuilder::new().recursive(true).mode(DIR_MODE).create(path) {
        debug!(path = %path.display(), error = %e, "Directory creation failed");
    }

    match fs::read_dir(path) {
        Ok(_) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Directory is not usable");
            false
        }
    }
}

/// Remove `path` and everything below it.
///
/// Depth-first, stays on the file system of `path`, never follows symbolic
/// links. Failures on individual entries are logged and skipped; a missing
/// `path` is a no-op.
pub fn remove_tree(path: &Path) {
    let walker = WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false)
        .same_file_system(true)
        .contents_first(true);

    let mut removed = 0usize;
    let mut skipped = 0usize;

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(error = %e, "Skipping entry during tree removal");
                skipped += 1;
                continue;
            }
        };

        let result = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) => {
                trace!(path = %entry.path().display(), error = %e, "Could not remove entry");
                skipped += 1;
            }
        }
    }

    debug!(path = %path.display(), removed, skipped, "Removed tree");
}

/// Find the newest readable version of `prefix` stored in `dir`.
///
/// Only entries named exactly `<prefix>-<digits>` count. A `max_version` of 0
/// means unbounded; otherwise newer versions are ignored. Returns `Ok(None)`
/// when nothing qualifies and `Err(NotFound)` when `dir` cannot be opened.
pub fn resolve_latest_version(dir: &Path, prefix: &str, max_version: u64) -> Result<Option<u64>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        debug!(dir = %dir.display(), error = %e, "Cannot open directory for version scan");
        TierError::NotFound(dir.to_path_buf())
    })?;

    let mut latest = None;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(dir = %dir.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        match classify_entry(dir, prefix, &name) {
            Ok(version) if max_version == 0 || version <= max_version => {
                latest = latest.max(Some(version));
            }
            Ok(version) => trace!(entry = %name, version, max_version, "Version above bound"),
            Err(e) => trace!(entry = %name, reason = %e, "Excluded from version scan"),
        }
    }

    debug!(dir = %dir.display(), prefix, max_version, latest = ?latest, "Resolved latest version");
    Ok(latest)
}

/// Map a version lookup onto the boundary status codes.
pub fn version_status(lookup: &Result<Option<u64>>) -> Status {
    match lookup {
        Ok(Some(_)) => Status::Success,
        Ok(None) => Status::Ignored,
        Err(TierError::NotFound(_)) => Status::NotFound,
        Err(_) => Status::Failure,
    }
}

/// Decide whether a single directory entry names a usable checkpoint.
fn classify_entry(dir: &Path, prefix: &str, name: &str) -> Result<u64> {
    let version = CheckpointIdentity::parse_version(prefix, name)
        .ok_or_else(|| TierError::Malformed(name.to_string()))?;

    let path = dir.join(name);
    access(path.as_path(), AccessFlags::R_OK).map_err(|_| TierError::PermissionDenied(path))?;

    Ok(version)
}
