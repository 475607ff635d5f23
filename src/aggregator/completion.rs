//! Per-round completion barrier across a fixed number of participants.
//!
//! - Every report goes to `RoundHooks::on_report` exactly once
//! - A round closes when it holds exactly `participant_count` reports
//! - A closed round goes to `RoundHooks::on_round_closed` exactly once and is
//!   cleared whatever the hook decides
//! - Checkpoint and restart rounds accumulate independently

use crate::models::{ParticipantReport, RoundKind, Status};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Decision policy supplied by the surrounding system.
pub trait RoundHooks {
    /// Called once for every submitted report, before it is accumulated.
    fn on_report(&mut self, report: &ParticipantReport) -> Status;

    /// Called once for every closed round with its reports in arrival order.
    fn on_round_closed(&mut self, reports: &[ParticipantReport]) -> Status;
}

/// What to do with a second report from a participant within an open round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Accumulate it like any other report. Callers guarantee one report per
    /// participant per round.
    #[default]
    Append,
    /// Drop it with a warning; `submit` returns `Ignored`.
    Reject,
}

/// Reports collected so far for the open round of one kind.
#[derive(Debug, Default)]
struct AggregationRound {
    reports: Vec<ParticipantReport>,
    members: HashSet<u32>,
}

impl AggregationRound {
    fn len(&self) -> usize {
        self.reports.len()
    }

    fn contains(&self, participant_id: u32) -> bool {
        self.members.contains(&participant_id)
    }

    fn push(&mut self, report: ParticipantReport) {
        self.members.insert(report.participant_id);
        self.reports.push(report);
    }

    /// Hand out the collected reports and reset for the next round.
    fn take(&mut self) -> Vec<ParticipantReport> {
        self.members.clear();
        std::mem::take(&mut self.reports)
    }
}

/// Turns independent participant reports into collective round decisions.
///
/// `submit` takes `&mut self`; wrap the aggregator in an
/// [`AggregatorHandle`](super::AggregatorHandle) when reports arrive from
/// several tasks.
pub struct CompletionAggregator<H> {
    participant_count: usize,
    policy: DuplicatePolicy,
    hooks: H,
    checkpoint: AggregationRound,
    restart: AggregationRound,
    completed_rounds: u64,
}

impl<H: RoundHooks> CompletionAggregator<H> {
    /// Create an aggregator for `participant_count` participants.
    ///
    /// A count of zero is treated as one.
    pub fn new(participant_count: usize, hooks: H) -> Self {
        if participant_count == 0 {
            warn!("Participant count of 0 requested, using 1");
        }
        Self {
            participant_count: participant_count.max(1),
            policy: DuplicatePolicy::default(),
            hooks,
            checkpoint: AggregationRound::default(),
            restart: AggregationRound::default(),
            completed_rounds: 0,
        }
    }

    /// Set the duplicate-report policy.
    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Feed one participant report into its round.
    ///
    /// Returns `Ignored` while the round is still open, otherwise whatever the
    /// round hook decided.
    pub fn submit(&mut self, report: ParticipantReport) -> Status {
        let verdict = self.hooks.on_report(&report);
        if verdict != Status::Success {
            debug!(
                participant = report.participant_id,
                kind = ?report.kind,
                %verdict,
                "Report hook did not succeed"
            );
        }

        let kind = report.kind;
        let round = match kind {
            RoundKind::Checkpoint => &mut self.checkpoint,
            RoundKind::Restart => &mut self.restart,
        };

        if self.policy == DuplicatePolicy::Reject && round.contains(report.participant_id) {
            warn!(
                participant = report.participant_id,
                kind = ?kind,
                version = report.version,
                "Duplicate report within open round, dropping"
            );
            return Status::Ignored;
        }

        if let Some(first) = round.reports.first() {
            if first.version != report.version || first.name != report.name {
                warn!(
                    participant = report.participant_id,
                    expected = %first.identity(),
                    got = %report.identity(),
                    "Report disagrees with the open round"
                );
            }
        }

        round.push(report);
        if round.len() < self.participant_count {
            return Status::Ignored;
        }

        let reports = round.take();
        let status = self.hooks.on_round_closed(&reports);

        if kind == RoundKind::Checkpoint && status == Status::Success {
            self.completed_rounds += 1;
        }

        info!(
            kind = ?kind,
            participants = reports.len(),
            failed = reports.iter().filter(|r| !r.is_ok()).count(),
            %status,
            completed_rounds = self.completed_rounds,
            "Round closed"
        );
        status
    }

    /// Number of checkpoint rounds the hook accepted.
    pub fn completed_rounds(&self) -> u64 {
        self.completed_rounds
    }

    /// Reports waiting in the open round of `kind`.
    pub fn pending(&self, kind: RoundKind) -> usize {
        match kind {
            RoundKind::Checkpoint => self.checkpoint.len(),
            RoundKind::Restart => self.restart.len(),
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participant_count
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    pub fn into_hooks(self) -> H {
        self.hooks
    }
}
