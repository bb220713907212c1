use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::job::ShardId;
use crate::resources::Resources;

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved,
    Denied(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The shard already holds a reservation; idempotency is the caller's
    /// concern.
    AlreadyReserved,
    InsufficientCpu,
    InsufficientMemory,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::AlreadyReserved => write!(f, "already reserved"),
            DenyReason::InsufficientCpu => write!(f, "insufficient cpu"),
            DenyReason::InsufficientMemory => write!(f, "insufficient memory"),
        }
    }
}

/// An internally consistent view of committed capacity.
#[derive(Debug, Clone, Copy)]
pub struct LedgerSnapshot {
    pub total_limits: Resources,
    pub in_use: Resources,
    /// Slack in each bounded dimension. Zero-limit dimensions report zero
    /// here; consult `total_limits` to tell "unlimited" from "exhausted".
    pub remaining: Resources,
}

impl LedgerSnapshot {
    /// Would `want` fit right now? Zero-limit dimensions always fit.
    pub fn fits(&self, want: Resources) -> bool {
        (self.total_limits.cpu_millicores == 0
            || want.cpu_millicores <= self.remaining.cpu_millicores)
            && (self.total_limits.memory_bytes == 0
                || want.memory_bytes <= self.remaining.memory_bytes)
    }
}

/// The single authority over currently-committed resources on this node.
///
/// Reservation requests mutate the map under a short internal lock that is
/// never held across a suspension point. Releases wake the bid queue
/// through [`CapacityLedger::capacity_freed`].
#[derive(Debug)]
pub struct CapacityLedger {
    total_limits: Resources,
    reservations: Mutex<HashMap<ShardId, Resources>>,
    freed: Notify,
}

impl CapacityLedger {
    pub fn new(total_limits: Resources) -> Self {
        Self {
            total_limits,
            reservations: Mutex::new(HashMap::new()),
            freed: Notify::new(),
        }
    }

    pub fn total_limits(&self) -> Resources {
        self.total_limits
    }

    /// Atomically reserve `want` for `shard`.
    ///
    /// Denies when the shard already holds a reservation, or when adding
    /// `want` would exceed a bounded dimension of the total limits.
    pub fn try_reserve(&self, shard: &ShardId, want: Resources) -> ReserveOutcome {
        let mut reservations = self.reservations.lock();
        if reservations.contains_key(shard) {
            return ReserveOutcome::Denied(DenyReason::AlreadyReserved);
        }
        let in_use = reservations
            .values()
            .fold(Resources::default(), |acc, r| acc.add(*r));
        let next = in_use.add(want);
        if self.total_limits.cpu_millicores > 0
            && next.cpu_millicores > self.total_limits.cpu_millicores
        {
            return ReserveOutcome::Denied(DenyReason::InsufficientCpu);
        }
        if self.total_limits.memory_bytes > 0 && next.memory_bytes > self.total_limits.memory_bytes
        {
            return ReserveOutcome::Denied(DenyReason::InsufficientMemory);
        }
        reservations.insert(shard.clone(), want);
        tracing::debug!(shard = %shard, want = %want, in_use = %next, "Reservation committed");
        ReserveOutcome::Reserved
    }

    /// Release the reservation held by `shard`, if any. Idempotent.
    ///
    /// A release that actually frees capacity emits the `capacity_freed`
    /// signal consumed by the bid queue.
    pub fn release(&self, shard: &ShardId) {
        let removed = self.reservations.lock().remove(shard);
        if let Some(freed) = removed {
            tracing::debug!(shard = %shard, freed = %freed, "Reservation released");
            self.freed.notify_one();
        }
    }

    /// Wait for the next `capacity_freed` signal. Signals emitted while no
    /// one is waiting are coalesced into a single stored permit.
    pub async fn capacity_freed(&self) {
        self.freed.notified().await;
    }

    /// A point-in-time view of committed capacity. The snapshot need not be
    /// transactionally consistent with a concurrent reserve, but the pair it
    /// returns is internally consistent.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let reservations = self.reservations.lock();
        let in_use = reservations
            .values()
            .fold(Resources::default(), |acc, r| acc.add(*r));
        LedgerSnapshot {
            total_limits: self.total_limits,
            in_use,
            remaining: self.total_limits.saturating_sub(in_use),
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.lock().is_empty()
    }
}
