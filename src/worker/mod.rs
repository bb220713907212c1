//! Shard execution: the executor seam and the runner that drives an
//! admitted shard end-to-end.
//!
//! # Execution flow
//!
//! 1. The node admits a shard and hands it to [`JobRunner::run_shard`]
//! 2. The engine's [`Executor`] runs the shard and captures output
//! 3. The verifier checks the execution result
//! 4. The publish dispatcher ships the result directory
//! 5. The ledger reservation is released on every exit path

pub mod executor;
pub mod noop;
pub mod runner;

pub use executor::{DockerExecutor, ExecutionResult, Executor};
pub use noop::{JobHandler, NoopExecutor};
pub use runner::{JobRunner, ShardOutcome, ShardReport, Stage};
