//! Serializing gate for concurrent report producers.
//!
//! One blocking task owns the aggregator and drains a channel, so rounds
//! close exactly once no matter how many tasks submit. Hooks run on that
//! task and may do blocking file I/O.

use super::{CompletionAggregator, RoundHooks};
use crate::models::{ParticipantReport, Result, Status, TierError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// Default number of queued reports before `submit` applies backpressure.
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct Submission {
    report: ParticipantReport,
    reply: oneshot::Sender<Status>,
}

/// Cloneable submission handle.
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<Submission>,
}

/// Owns the task that drives the aggregator.
pub struct AggregatorService<H> {
    worker: JoinHandle<CompletionAggregator<H>>,
}

impl AggregatorHandle {
    /// Move `aggregator` onto a dedicated blocking task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<H>(aggregator: CompletionAggregator<H>) -> (Self, AggregatorService<H>)
    where
        H: RoundHooks + Send + 'static,
    {
        Self::spawn_with_depth(aggregator, DEFAULT_QUEUE_DEPTH)
    }

    pub fn spawn_with_depth<H>(
        mut aggregator: CompletionAggregator<H>,
        depth: usize,
    ) -> (Self, AggregatorService<H>)
    where
        H: RoundHooks + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Submission>(depth.max(1));

        let worker = tokio::task::spawn_blocking(move || {
            while let Some(Submission { report, reply }) = rx.blocking_recv() {
                let status = aggregator.submit(report);
                // Submitter may have given up waiting
                let _ = reply.send(status);
            }
            debug!(
                completed_rounds = aggregator.completed_rounds(),
                "Aggregator task stopped"
            );
            aggregator
        });

        (Self { tx }, AggregatorService { worker })
    }

    /// Submit a report and wait for its status.
    pub async fn submit(&self, report: ParticipantReport) -> Result<Status> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Submission { report, reply })
            .await
            .map_err(|_| TierError::ChannelClosed)?;
        rx.await.map_err(|_| TierError::ChannelClosed)
    }
}

impl<H> AggregatorService<H> {
    /// Wait for the task to stop and take the aggregator back.
    ///
    /// Completes once every [`AggregatorHandle`] has been dropped.
    pub async fn join(self) -> Result<CompletionAggregator<H>> {
        self.worker
            .await
            .map_err(|e| TierError::Internal(format!("Aggregator task failed: {e}")))
    }
}
