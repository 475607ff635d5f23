//! tierpoint - Collective checkpoint aggregation and tiered checkpoint storage.
//!
//! ## Architecture
//!
//! Components, leaves first:
//! - **storage**: blocking file primitives, zero-copy transfer, directory
//!   lifecycle and version discovery over `<name>-<version>` entries
//! - **aggregator**: per-round barrier that turns N participant reports into
//!   one collective decision through injected `RoundHooks`
//! - **checkpoint**: the hooks that migrate committed rounds from the scratch
//!   tier to the persistent tier and stage restarts back
//!
//! ## Flow
//!
//! Participant reports → `CompletionAggregator::submit` → `RoundHooks::on_report`
//! → (round full) → `RoundHooks::on_round_closed` → `TierMigrator` → storage

pub mod aggregator;
pub mod checkpoint;
pub mod models;
pub mod storage;

// Re-exports for convenience
pub use aggregator::{AggregatorHandle, CompletionAggregator, DuplicatePolicy, RoundHooks};
pub use checkpoint::{recover_staging, CheckpointManifest, TierMigrator};
pub use models::{
    CheckpointIdentity, Config, Outcome, ParticipantReport, Result, RoundKind, Status, TierError,
};
