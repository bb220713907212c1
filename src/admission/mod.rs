//! Job admission: the capacity ledger, the selection policy, and the bid
//! queue that re-offers skipped candidates when capacity frees up.

pub mod bidqueue;
pub mod ledger;
pub mod policy;

pub use bidqueue::{BidQueue, QueuedBid};
pub use ledger::{CapacityLedger, DenyReason, LedgerSnapshot, ReserveOutcome};
pub use policy::{ProbeData, ProbeResources, Selection, SelectionPolicy};
