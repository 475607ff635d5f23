//! Crash recovery for the persistent tier.
//!
//! A crash during migration leaves a hidden staging directory behind. Such
//! directories never match the naming convention, so they are invisible to
//! version discovery; this sweep reclaims their space.

use super::migrator::STAGING_MARKER;
use crate::models::{Result, TierError};
use crate::storage::remove_tree;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Staging directories left in `persistent` by interrupted migrations.
pub fn find_staging(persistent: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/.*{STAGING_MARKER}*",
        glob::Pattern::escape(&persistent.to_string_lossy())
    );

    let paths = glob::glob(&pattern)
        .map_err(|e| TierError::Internal(format!("Invalid glob pattern: {e}")))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(paths)
}

/// Remove every staging directory in `persistent`; returns how many were found.
pub fn recover_staging(persistent: &Path) -> Result<usize> {
    let stale = find_staging(persistent)?;

    if stale.is_empty() {
        debug!(dir = %persistent.display(), "No interrupted migrations");
        return Ok(0);
    }

    for path in &stale {
        warn!(path = %path.display(), "Removing interrupted migration");
        remove_tree(path);
    }
    Ok(stale.len())
}
