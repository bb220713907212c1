use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::admission::{
    BidQueue, CapacityLedger, DenyReason, QueuedBid, ReserveOutcome, Selection, SelectionPolicy,
};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::job::{JobSpec, ResourceProfile, Shard};
use crate::publisher::Publisher;
use crate::verifier::Verifier;
use crate::worker::{Executor, JobRunner, ShardReport};

/// What happened to a submitted job at admission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Every shard reserved capacity and is now running.
    Admitted,
    /// The node wants the job but cannot fit it yet; it waits in the bid
    /// queue.
    Queued,
    /// The node will not bid on this job.
    Rejected(String),
}

enum AdmitResult {
    Admitted,
    NoCapacity,
}

/// The compute node core: receives candidate jobs, decides whether to bid,
/// runs admitted shards inside the capacity envelope, and re-bids on
/// skipped candidates as capacity frees up.
pub struct ComputeNode {
    pub config: NodeConfig,
    ledger: Arc<CapacityLedger>,
    policy: SelectionPolicy,
    queue: Arc<BidQueue>,
    runner: Arc<JobRunner>,
    ctx: CancellationToken,
    reports: broadcast::Sender<ShardReport>,
}

impl ComputeNode {
    pub fn new(
        config: NodeConfig,
        executor: Arc<dyn Executor>,
        verifier: Arc<dyn Verifier>,
        publisher: Arc<dyn Publisher>,
        ctx: CancellationToken,
    ) -> Arc<Self> {
        let ledger = Arc::new(CapacityLedger::new(config.total_limits));
        let policy = SelectionPolicy::new(config.job_selection_policy.clone());
        let queue = Arc::new(BidQueue::new(config.bid_queue.clone()));
        let runner = Arc::new(JobRunner::new(
            config.host_id.clone(),
            executor,
            verifier,
            publisher,
            Arc::clone(&ledger),
            config.max_parallel_jobs,
        ));
        let (reports, _) = broadcast::channel(256);

        Arc::new(Self {
            config,
            ledger,
            policy,
            queue,
            runner,
            ctx,
            reports,
        })
    }

    /// Start the back-bid loop. Call once after construction.
    pub fn start(self: &Arc<Self>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.backbid_loop().await;
        });
    }

    /// Terminal shard reports, one per admitted shard.
    pub fn subscribe(&self) -> broadcast::Receiver<ShardReport> {
        self.reports.subscribe()
    }

    pub fn ledger(&self) -> &Arc<CapacityLedger> {
        &self.ledger
    }

    pub fn queued_bids(&self) -> usize {
        self.queue.len()
    }

    /// Offer a candidate job to this node.
    pub async fn submit(&self, job: JobSpec) -> Result<SubmitOutcome> {
        if self.ctx.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        let job = Arc::new(job);
        let profile = ResourceProfile::new(
            job.resources,
            self.config.default_job_resources,
            self.config.total_limits,
        );
        let snapshot = self.ledger.snapshot();

        match self
            .policy
            .select(&self.ctx, &job, &profile, &snapshot)
            .await?
        {
            Selection::Accept => match self.admit(Arc::clone(&job), profile)? {
                AdmitResult::Admitted => Ok(SubmitOutcome::Admitted),
                AdmitResult::NoCapacity => {
                    // Lost a race against another admission between the
                    // capacity gate and the reservation.
                    let reason = "capacity taken during admission".to_string();
                    self.queue.push(QueuedBid::new(job, profile, reason));
                    // A release may have landed between the snapshot and
                    // the push; re-check rather than wait for the next
                    // signal.
                    self.drain_bid_queue();
                    Ok(SubmitOutcome::Queued)
                }
            },
            Selection::RejectTransient(reason) => {
                tracing::info!(job_id = %job.id, reason = %reason, "No capacity right now, retaining bid");
                self.queue.push(QueuedBid::new(job, profile, reason));
                self.drain_bid_queue();
                Ok(SubmitOutcome::Queued)
            }
            Selection::RejectTerminal(reason) => {
                tracing::info!(job_id = %job.id, reason = %reason, "Declining to bid");
                Ok(SubmitOutcome::Rejected(reason))
            }
        }
    }

    /// Reserve every shard of the job, all-or-nothing, and spawn runners.
    fn admit(&self, job: Arc<JobSpec>, profile: ResourceProfile) -> Result<AdmitResult> {
        let shards = job.shards();
        let mut reserved = Vec::new();
        for shard in &shards {
            match self.ledger.try_reserve(&shard.id(), profile.effective) {
                ReserveOutcome::Reserved => reserved.push(shard.id()),
                ReserveOutcome::Denied(DenyReason::AlreadyReserved) => {
                    for id in &reserved {
                        self.ledger.release(id);
                    }
                    return Err(NodeError::AlreadyReserved(shard.id().to_string()));
                }
                ReserveOutcome::Denied(_) => {
                    for id in &reserved {
                        self.ledger.release(id);
                    }
                    return Ok(AdmitResult::NoCapacity);
                }
            }
        }

        tracing::info!(job_id = %job.id, shards = shards.len(), "Job admitted");
        for shard in shards {
            self.spawn_runner(shard);
        }
        Ok(AdmitResult::Admitted)
    }

    fn spawn_runner(&self, shard: Shard) {
        let runner = Arc::clone(&self.runner);
        let ctx = self.ctx.child_token();
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let report = runner.run_shard(ctx, shard).await;
            // Nobody listening is fine; the ledger release already happened.
            let _ = reports.send(report);
        });
    }

    /// Wake on every `capacity_freed` signal and re-offer queued bids,
    /// oldest first, re-running only the capacity gate.
    async fn backbid_loop(&self) {
        loop {
            tokio::select! {
                _ = self.ctx.cancelled() => break,
                _ = self.ledger.capacity_freed() => {}
            }
            self.drain_bid_queue();
        }
        self.queue.clear();
    }

    fn drain_bid_queue(&self) {
        while let Some(bid) = self
            .queue
            .pop_fitting(|want| self.ledger.snapshot().fits(want))
        {
            tracing::info!(job_id = %bid.job.id, "Re-bidding on queued job");
            match self.admit(Arc::clone(&bid.job), bid.profile) {
                Ok(AdmitResult::Admitted) => {}
                Ok(AdmitResult::NoCapacity) => {
                    // Still first in line: the entry keeps its place.
                    self.queue.push(bid);
                    break;
                }
                Err(err) => {
                    tracing::warn!(job_id = %bid.job.id, error = %err, "Dropping queued bid");
                }
            }
        }
    }

    /// Cancel everything and wait for the ledger and queue to reach their
    /// quiescent empty state.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down, draining reservations");
        self.ctx.cancel();
        self.queue.clear();
        while !self.ledger.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tracing::info!("Node quiescent");
    }
}
