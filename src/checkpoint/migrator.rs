//! Round hooks that move checkpoints between the scratch and persistent tiers.
//!
//! Layout:
//! - scratch: `<scratch>/<name>-<version>/<participant>.ckpt`
//! - persistent: `<persistent>/<name>-<version>/<participant>.ckpt` plus
//!   `manifest.json`
//!
//! A checkpoint is assembled in a hidden staging directory and renamed into
//! place only after every artifact and the manifest are written, so version
//! discovery never sees a partial checkpoint.

use super::manifest::{ArtifactRecord, CheckpointManifest, MANIFEST_FILE};
use crate::aggregator::RoundHooks;
use crate::models::{
    CheckpointIdentity, ParticipantReport, Result, RoundKind, Status, TierError,
};
use crate::storage::{
    ensure_directory, file_size, remove_tree, resolve_latest_version, transfer_file,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Marker separating the stamp from the unique suffix of a staging directory.
pub const STAGING_MARKER: &str = ".staging-";

/// File name of a participant's artifact.
pub fn artifact_name(participant_id: u32) -> String {
    format!("{participant_id}.ckpt")
}

/// Migrates closed checkpoint rounds to the persistent tier and stages
/// restart rounds back to scratch.
#[derive(Debug, Clone)]
pub struct TierMigrator {
    scratch: PathBuf,
    persistent: PathBuf,
    last_committed: Option<CheckpointIdentity>,
    last_restored: Option<CheckpointIdentity>,
}

impl TierMigrator {
    pub fn new(scratch: impl Into<PathBuf>, persistent: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
            persistent: persistent.into(),
            last_committed: None,
            last_restored: None,
        }
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    pub fn persistent(&self) -> &Path {
        &self.persistent
    }

    /// Most recent checkpoint moved to the persistent tier.
    pub fn last_committed(&self) -> Option<&CheckpointIdentity> {
        self.last_committed.as_ref()
    }

    /// Most recent checkpoint staged back for restart.
    pub fn last_restored(&self) -> Option<&CheckpointIdentity> {
        self.last_restored.as_ref()
    }

    /// Scratch-tier directory of a checkpoint.
    pub fn scratch_dir(&self, id: &CheckpointIdentity) -> PathBuf {
        self.scratch.join(id.stamp())
    }

    /// Persistent-tier directory of a checkpoint.
    pub fn persistent_dir(&self, id: &CheckpointIdentity) -> PathBuf {
        self.persistent.join(id.stamp())
    }

    /// Where a participant writes its artifact before the round closes.
    pub fn scratch_artifact(&self, id: &CheckpointIdentity, participant_id: u32) -> PathBuf {
        self.scratch_dir(id).join(artifact_name(participant_id))
    }

    /// Copy every participant's artifact into the persistent tier.
    pub fn commit(
        &self,
        id: &CheckpointIdentity,
        reports: &[ParticipantReport],
    ) -> Result<CheckpointManifest> {
        CheckpointIdentity::validate_name(&id.name)?;
        if !ensure_directory(&self.persistent) {
            return Err(TierError::NotFound(self.persistent.clone()));
        }

        if let Some((latest, _)) = self.latest_committed(&id.name, 0)? {
            if id.version <= latest.version {
                return Err(TierError::Internal(format!(
                    "{id} does not advance past committed {latest}"
                )));
            }
        }

        let target = self.persistent_dir(id);
        if target.exists() {
            return Err(TierError::Internal(format!(
                "{} already exists",
                target.display()
            )));
        }

        let staging = self.persistent.join(format!(
            ".{}{STAGING_MARKER}{}",
            id.stamp(),
            Uuid::new_v4().simple()
        ));
        if !ensure_directory(&staging) {
            return Err(TierError::NotFound(staging));
        }

        let result = self.fill_staging(id, reports, &staging).and_then(|manifest| {
            fs::rename(&staging, &target).map_err(|e| {
                TierError::io(format!("publishing {}", target.display()), e)
            })?;
            Ok(manifest)
        });

        if result.is_err() {
            remove_tree(&staging);
        }
        result
    }

    fn fill_staging(
        &self,
        id: &CheckpointIdentity,
        reports: &[ParticipantReport],
        staging: &Path,
    ) -> Result<CheckpointManifest> {
        let mut artifacts = Vec::with_capacity(reports.len());
        for report in reports {
            let file = artifact_name(report.participant_id);
            let bytes = transfer_file(
                &self.scratch_artifact(id, report.participant_id),
                &staging.join(&file),
            )?;
            artifacts.push(ArtifactRecord {
                participant_id: report.participant_id,
                file,
                bytes,
            });
        }

        let manifest = CheckpointManifest::new(id, artifacts);
        manifest.write(&staging.join(MANIFEST_FILE))?;
        Ok(manifest)
    }

    /// Newest version of `name` not above `max_version` (0 = unbounded) whose
    /// manifest reads back.
    ///
    /// Directories without a readable manifest were never committed and are
    /// skipped in favour of the next lower version.
    pub fn latest_committed(
        &self,
        name: &str,
        max_version: u64,
    ) -> Result<Option<(CheckpointIdentity, CheckpointManifest)>> {
        let mut bound = max_version;
        loop {
            let Some(version) = resolve_latest_version(&self.persistent, name, bound)? else {
                return Ok(None);
            };
            let id = CheckpointIdentity::new(name, version);
            if let Some(manifest) = self.read_manifest(&id)? {
                return Ok(Some((id, manifest)));
            }

            // A bound of 0 means unbounded, so version 0 is checked by hand.
            match version {
                0 => return Ok(None),
                1 => {
                    let id = CheckpointIdentity::new(name, 0);
                    if !self.persistent_dir(&id).is_dir() {
                        return Ok(None);
                    }
                    return Ok(self.read_manifest(&id)?.map(|manifest| (id, manifest)));
                }
                _ => bound = version - 1,
            }
        }
    }

    fn read_manifest(&self, id: &CheckpointIdentity) -> Result<Option<CheckpointManifest>> {
        match CheckpointManifest::read(&self.persistent_dir(id).join(MANIFEST_FILE)) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) if e.is_not_found() || matches!(e, TierError::ParseError(_)) => {
                warn!(checkpoint = %id, error = %e, "Skipping uncommitted checkpoint directory");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stage the newest committed version not above `requested` (0 = latest)
    /// back into scratch for every reporting participant.
    pub fn restore(
        &self,
        name: &str,
        requested: u64,
        reports: &[ParticipantReport],
    ) -> Result<CheckpointIdentity> {
        CheckpointIdentity::validate_name(name)?;
        let (id, manifest) = self
            .latest_committed(name, requested)?
            .ok_or_else(|| TierError::NotFound(self.persistent.join(format!("{name}-*"))))?;
        let source = self.persistent_dir(&id);

        let scratch_dir = self.scratch_dir(&id);
        if !ensure_directory(&scratch_dir) {
            return Err(TierError::NotFound(scratch_dir));
        }

        for report in reports {
            let record = manifest.artifact(report.participant_id).ok_or_else(|| {
                TierError::NotFound(source.join(artifact_name(report.participant_id)))
            })?;
            let src = source.join(&record.file);
            let moved = transfer_file(&src, &self.scratch_artifact(&id, report.participant_id))?;
            if moved != record.bytes {
                return Err(TierError::Truncated {
                    path: src,
                    expected: record.bytes,
                    moved,
                });
            }
        }

        Ok(id)
    }
}

impl RoundHooks for TierMigrator {
    fn on_report(&mut self, report: &ParticipantReport) -> Status {
        if let Err(e) = CheckpointIdentity::validate_name(&report.name) {
            warn!(participant = report.participant_id, error = %e, "Report rejected");
            return Status::Failure;
        }

        if report.kind != RoundKind::Checkpoint || !report.is_ok() {
            debug!(
                participant = report.participant_id,
                kind = ?report.kind,
                outcome = ?report.outcome,
                "Report received"
            );
            return Status::Success;
        }

        let artifact = self.scratch_artifact(&report.identity(), report.participant_id);
        match file_size(&artifact) {
            Ok(bytes) => {
                debug!(participant = report.participant_id, bytes, "Artifact ready");
                Status::Success
            }
            Err(e) => {
                warn!(
                    participant = report.participant_id,
                    path = %artifact.display(),
                    error = %e,
                    "Participant reported success but its artifact is missing"
                );
                Status::Failure
            }
        }
    }

    fn on_round_closed(&mut self, reports: &[ParticipantReport]) -> Status {
        let Some(first) = reports.first() else {
            return Status::Ignored;
        };

        let failed: Vec<u32> = reports
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.participant_id)
            .collect();
        if !failed.is_empty() {
            warn!(
                kind = ?first.kind,
                checkpoint = %first.identity(),
                failed = ?failed,
                "Round rejected: participants failed"
            );
            return Status::Failure;
        }

        match first.kind {
            RoundKind::Checkpoint => {
                let id = first.identity();
                match self.commit(&id, reports) {
                    Ok(manifest) => {
                        info!(
                            checkpoint = %id,
                            artifacts = manifest.artifacts.len(),
                            bytes = manifest.total_bytes(),
                            "Checkpoint committed to persistent tier"
                        );
                        self.last_committed = Some(id);
                        Status::Success
                    }
                    Err(e) => {
                        warn!(checkpoint = %id, error = %e, "Checkpoint migration failed");
                        Status::Failure
                    }
                }
            }
            RoundKind::Restart => match self.restore(&first.name, first.version, reports) {
                Ok(id) => {
                    info!(checkpoint = %id, participants = reports.len(), "Restart staged");
                    self.last_restored = Some(id);
                    Status::Success
                }
                Err(e) => {
                    warn!(
                        name = %first.name,
                        requested = first.version,
                        error = %e,
                        "Restart staging failed"
                    );
                    if e.is_not_found() {
                        Status::NotFound
                    } else {
                        Status::Failure
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::CompletionAggregator;
    use crate::models::Outcome;
    use tempfile::TempDir;

    struct Tiers {
        _temp: TempDir,
        migrator: TierMigrator,
    }

    fn tiers() -> Tiers {
        let temp = TempDir::new().unwrap();
        let migrator = TierMigrator::new(temp.path().join("scratch"), temp.path().join("persistent"));
        Tiers {
            _temp: temp,
            migrator,
        }
    }

    fn write_artifact(migrator: &TierMigrator, version: u64, participant: u32, data: &[u8]) {
        let id = CheckpointIdentity::new("run", version);
        fs::create_dir_all(migrator.scratch_dir(&id)).unwrap();
        fs::write(migrator.scratch_artifact(&id, participant), data).unwrap();
    }

    fn ckpt(id: u32, outcome: Outcome, version: u64) -> ParticipantReport {
        ParticipantReport::new(id, "run", RoundKind::Checkpoint, outcome, version)
    }

    fn restart(id: u32, version: u64) -> ParticipantReport {
        ParticipantReport::new(id, "run", RoundKind::Restart, Outcome::Ok, version)
    }

    #[test]
    fn test_successful_round_is_migrated() {
        let t = tiers();
        for p in 0..3 {
            write_artifact(&t.migrator, 7, p, format!("state of {p}").as_bytes());
        }

        let mut agg = CompletionAggregator::new(3, t.migrator.clone());
        assert_eq!(agg.submit(ckpt(0, Outcome::Ok, 7)), Status::Ignored);
        assert_eq!(agg.submit(ckpt(1, Outcome::Ok, 7)), Status::Ignored);
        assert_eq!(agg.submit(ckpt(2, Outcome::Ok, 7)), Status::Success);
        assert_eq!(agg.completed_rounds(), 1);

        let migrator = agg.into_hooks();
        let id = CheckpointIdentity::new("run", 7);
        assert_eq!(migrator.last_committed(), Some(&id));

        let dir = migrator.persistent_dir(&id);
        assert_eq!(fs::read(dir.join("2.ckpt")).unwrap(), b"state of 2");
        let manifest = CheckpointManifest::read(&dir.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.artifacts.len(), 3);
        assert_eq!(
            resolve_latest_version(migrator.persistent(), "run", 0).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_failed_round_is_not_migrated() {
        let t = tiers();
        for p in 0..2 {
            write_artifact(&t.migrator, 7, p, b"x");
        }

        let mut agg = CompletionAggregator::new(3, t.migrator.clone());
        agg.submit(ckpt(0, Outcome::Ok, 7));
        agg.submit(ckpt(1, Outcome::Ok, 7));
        assert_eq!(agg.submit(ckpt(2, Outcome::Failed, 7)), Status::Failure);
        assert_eq!(agg.completed_rounds(), 0);

        let migrator = agg.into_hooks();
        assert!(migrator.last_committed().is_none());
        assert!(!migrator.persistent_dir(&CheckpointIdentity::new("run", 7)).exists());
    }

    #[test]
    fn test_missing_artifact_leaves_no_partial_checkpoint() {
        let t = tiers();
        write_artifact(&t.migrator, 4, 0, b"only one");

        let mut migrator = t.migrator.clone();
        let reports = vec![ckpt(0, Outcome::Ok, 4), ckpt(1, Outcome::Ok, 4)];
        assert_eq!(migrator.on_report(&reports[1]), Status::Failure);
        assert_eq!(migrator.on_round_closed(&reports), Status::Failure);

        let leftovers: Vec<_> = fs::read_dir(migrator.persistent()).unwrap().collect();
        assert!(leftovers.is_empty());
        assert_eq!(
            resolve_latest_version(migrator.persistent(), "run", 0).unwrap(),
            None
        );
    }

    #[test]
    fn test_committed_version_is_never_overwritten() {
        let t = tiers();
        write_artifact(&t.migrator, 2, 0, b"first");

        let mut migrator = t.migrator.clone();
        let reports = vec![ckpt(0, Outcome::Ok, 2)];
        assert_eq!(migrator.on_round_closed(&reports), Status::Success);

        write_artifact(&migrator, 2, 0, b"second");
        assert_eq!(migrator.on_round_closed(&reports), Status::Failure);

        let dir = migrator.persistent_dir(&CheckpointIdentity::new("run", 2));
        assert_eq!(fs::read(dir.join("0.ckpt")).unwrap(), b"first");
    }

    #[test]
    fn test_version_must_increase() {
        let t = tiers();
        write_artifact(&t.migrator, 5, 0, b"five");
        write_artifact(&t.migrator, 3, 0, b"three");

        let mut agg = CompletionAggregator::new(1, t.migrator.clone());
        assert_eq!(agg.submit(ckpt(0, Outcome::Ok, 5)), Status::Success);
        assert_eq!(agg.submit(ckpt(0, Outcome::Ok, 3)), Status::Failure);
        assert_eq!(agg.completed_rounds(), 1);

        let migrator = agg.into_hooks();
        assert_eq!(migrator.last_committed(), Some(&CheckpointIdentity::new("run", 5)));
        assert!(!migrator.persistent_dir(&CheckpointIdentity::new("run", 3)).exists());
    }

    #[test]
    fn test_uncommitted_directory_does_not_block_commit() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        fs::create_dir_all(migrator.persistent().join("run-9")).unwrap();

        write_artifact(&migrator, 4, 0, b"four");
        assert_eq!(
            migrator.on_round_closed(&[ckpt(0, Outcome::Ok, 4)]),
            Status::Success
        );
    }

    #[test]
    fn test_name_outside_tier_is_rejected() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        let root = migrator.persistent().parent().unwrap().to_path_buf();
        let report = ParticipantReport::new(0, "../escape", RoundKind::Checkpoint, Outcome::Ok, 1);

        assert_eq!(migrator.on_report(&report), Status::Failure);
        assert_eq!(migrator.on_round_closed(&[report.clone()]), Status::Failure);
        assert!(matches!(
            migrator.commit(&report.identity(), &[report]),
            Err(TierError::Malformed(_))
        ));

        let restart = ParticipantReport::new(0, "..", RoundKind::Restart, Outcome::Ok, 0);
        assert_eq!(migrator.on_round_closed(&[restart]), Status::Failure);

        assert!(!root.join("escape-1").exists());
        assert!(migrator.last_committed().is_none());
    }

    #[test]
    fn test_restart_skips_uncommitted_directory() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        write_artifact(&migrator, 3, 0, b"three");
        assert_eq!(
            migrator.on_round_closed(&[ckpt(0, Outcome::Ok, 3)]),
            Status::Success
        );
        fs::create_dir(migrator.persistent().join("run-9")).unwrap();
        fs::create_dir(migrator.persistent().join("run-7")).unwrap();
        fs::write(
            migrator.persistent().join("run-7").join(MANIFEST_FILE),
            b"{ not json",
        )
        .unwrap();
        fs::remove_dir_all(migrator.scratch()).unwrap();

        assert_eq!(migrator.on_round_closed(&[restart(0, 0)]), Status::Success);
        let id = CheckpointIdentity::new("run", 3);
        assert_eq!(migrator.last_restored(), Some(&id));
        assert_eq!(fs::read(migrator.scratch_artifact(&id, 0)).unwrap(), b"three");
    }

    #[test]
    fn test_restart_falls_back_to_version_zero() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        write_artifact(&migrator, 0, 0, b"zero");
        assert_eq!(
            migrator.on_round_closed(&[ckpt(0, Outcome::Ok, 0)]),
            Status::Success
        );
        fs::create_dir(migrator.persistent().join("run-1")).unwrap();

        assert_eq!(migrator.on_round_closed(&[restart(0, 0)]), Status::Success);
        assert_eq!(migrator.last_restored(), Some(&CheckpointIdentity::new("run", 0)));
    }

    #[test]
    fn test_restart_stages_latest_version_back() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        for version in [3, 5] {
            for p in 0..2 {
                write_artifact(&migrator, version, p, format!("v{version} p{p}").as_bytes());
            }
            let reports = vec![ckpt(0, Outcome::Ok, version), ckpt(1, Outcome::Ok, version)];
            assert_eq!(migrator.on_round_closed(&reports), Status::Success);
        }
        fs::remove_dir_all(migrator.scratch()).unwrap();

        let mut agg = CompletionAggregator::new(2, migrator);
        assert_eq!(agg.submit(restart(0, 0)), Status::Ignored);
        assert_eq!(agg.submit(restart(1, 0)), Status::Success);
        assert_eq!(agg.completed_rounds(), 0);

        let migrator = agg.into_hooks();
        let id = CheckpointIdentity::new("run", 5);
        assert_eq!(migrator.last_restored(), Some(&id));
        assert_eq!(fs::read(migrator.scratch_artifact(&id, 1)).unwrap(), b"v5 p1");
    }

    #[test]
    fn test_restart_respects_requested_bound() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        for version in [3, 5] {
            write_artifact(&migrator, version, 0, b"data");
            assert_eq!(
                migrator.on_round_closed(&[ckpt(0, Outcome::Ok, version)]),
                Status::Success
            );
        }

        assert_eq!(migrator.on_round_closed(&[restart(0, 4)]), Status::Success);
        assert_eq!(migrator.last_restored(), Some(&CheckpointIdentity::new("run", 3)));
    }

    #[test]
    fn test_restart_without_checkpoint_is_not_found() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        assert!(ensure_directory(migrator.persistent()));
        assert_eq!(migrator.on_round_closed(&[restart(0, 0)]), Status::NotFound);

        match migrator.restore("run", 0, &[restart(0, 0)]) {
            Err(TierError::NotFound(path)) => {
                assert_eq!(path, migrator.persistent().join("run-*"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_restart_for_unknown_participant_fails() {
        let t = tiers();
        let mut migrator = t.migrator.clone();
        write_artifact(&migrator, 1, 0, b"data");
        assert_eq!(
            migrator.on_round_closed(&[ckpt(0, Outcome::Ok, 1)]),
            Status::Success
        );

        assert_eq!(migrator.on_round_closed(&[restart(9, 0)]), Status::NotFound);
    }
}
