//! Checkpoint migration between storage tiers.
//!
//! Provides:
//! - `TierMigrator`: round hooks that commit checkpoints and stage restarts
//! - `CheckpointManifest`: description written into every committed checkpoint
//! - `recover_staging`: startup sweep of interrupted migrations

mod manifest;
mod migrator;
mod recovery;

pub use manifest::*;
pub use migrator::*;
pub use recovery::*;
