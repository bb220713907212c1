use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::BidQueueConfig;
use crate::job::{JobSpec, ResourceProfile};
use crate::resources::Resources;

/// A candidate job retained after a transient capacity rejection.
#[derive(Debug, Clone)]
pub struct QueuedBid {
    pub job: Arc<JobSpec>,
    pub profile: ResourceProfile,
    pub first_seen: DateTime<Utc>,
    pub reason: String,
}

impl QueuedBid {
    pub fn new(job: Arc<JobSpec>, profile: ResourceProfile, reason: String) -> Self {
        Self {
            job,
            profile,
            first_seen: Utc::now(),
            reason,
        }
    }
}

/// Retains recently-skipped candidates so the node can re-bid on them when
/// capacity frees up.
///
/// Strictly FIFO by first-seen time, ties broken by job id. Bounded: when
/// full, a new entry evicts the oldest. Entries past the TTL are evicted
/// and logged during each walk.
#[derive(Debug)]
pub struct BidQueue {
    config: BidQueueConfig,
    entries: Mutex<Vec<QueuedBid>>,
}

impl BidQueue {
    pub fn new(config: BidQueueConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Retain a transiently-rejected candidate, preserving FIFO order.
    pub fn push(&self, bid: QueuedBid) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.config.max_queued {
            let evicted = entries.remove(0);
            tracing::warn!(
                job_id = %evicted.job.id,
                queued = entries.len(),
                "Bid queue full, evicting oldest entry"
            );
        }
        let key = (bid.first_seen, bid.job.id.clone());
        let position = entries
            .binary_search_by(|probe| (probe.first_seen, probe.job.id.clone()).cmp(&key))
            .unwrap_or_else(|insert_at| insert_at);
        tracing::info!(job_id = %bid.job.id, reason = %bid.reason, "Retaining bid for later");
        entries.insert(position, bid);
    }

    /// Remove and return the oldest non-expired entry whose effective
    /// resources satisfy `fits`. Entries still too large remain queued.
    pub fn pop_fitting(&self, fits: impl Fn(Resources) -> bool) -> Option<QueuedBid> {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        let position = entries.iter().position(|bid| fits(bid.profile.effective))?;
        Some(entries.remove(position))
    }

    fn evict_expired(&self, entries: &mut Vec<QueuedBid>) {
        let now = Utc::now();
        entries.retain(|bid| {
            let age = (now - bid.first_seen)
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            let expired = age > self.config.ttl;
            if expired {
                tracing::warn!(
                    job_id = %bid.job.id,
                    age_secs = age.as_secs(),
                    "Evicting expired bid"
                );
            }
            !expired
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every retained entry. Used during shutdown to reach a quiescent
    /// state.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            tracing::info!(dropped = entries.len(), "Clearing bid queue");
            entries.clear();
        }
    }
}
