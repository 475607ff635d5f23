//! Manifest describing one committed checkpoint in the persistent tier.
//!
//! The manifest is the last file written into a staging directory; a
//! checkpoint directory without one was never committed.

use crate::models::{CheckpointIdentity, Result, TierError};
use crate::storage::{file_size, read_file, write_file};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the manifest inside a checkpoint directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One participant's artifact inside a checkpoint directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Participant that produced the artifact
    pub participant_id: u32,
    /// File name relative to the checkpoint directory
    pub file: String,
    /// Size in bytes at migration time
    pub bytes: u64,
}

/// Committed checkpoint description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub name: String,
    pub version: u64,
    pub artifacts: Vec<ArtifactRecord>,
    pub committed_at: DateTime<Utc>,
}

impl CheckpointManifest {
    pub fn new(identity: &CheckpointIdentity, artifacts: Vec<ArtifactRecord>) -> Self {
        Self {
            name: identity.name.clone(),
            version: identity.version,
            artifacts,
            committed_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> CheckpointIdentity {
        CheckpointIdentity::new(self.name.clone(), self.version)
    }

    /// Record for `participant_id`, if it contributed.
    pub fn artifact(&self, participant_id: u32) -> Option<&ArtifactRecord> {
        self.artifacts
            .iter()
            .find(|a| a.participant_id == participant_id)
    }

    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.bytes).sum()
    }

    /// Write the manifest to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|e| TierError::Internal(format!("Serializing manifest: {e}")))?;
        write_file(path, &content)
    }

    /// Read a manifest back from `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let len = usize::try_from(file_size(path)?)
            .map_err(|_| TierError::ParseError(format!("{} is too large", path.display())))?;
        let mut content = vec![0u8; len];
        read_file(path, &mut content)?;
        serde_json::from_slice(&content).map_err(|e| {
            TierError::ParseError(format!("Invalid manifest {}: {e}", path.display()))
        })
    }
}
