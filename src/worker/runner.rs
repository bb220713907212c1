use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::admission::CapacityLedger;
use crate::error::NodeError;
use crate::job::{Shard, ShardId};
use crate::publisher::{PublishSpec, Publisher};
use crate::verifier::{Verdict, Verifier};
use crate::worker::executor::Executor;

/// The pipeline stage a shard failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Execute,
    Verify,
    Publish,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Execute => write!(f, "execute"),
            Stage::Verify => write!(f, "verify"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// Terminal result of one shard run.
#[derive(Debug, Clone)]
pub enum ShardOutcome {
    Published(PublishSpec),
    Failed {
        stage: Stage,
        kind: &'static str,
        reason: String,
    },
}

/// A terminal report tagged with the shard it belongs to.
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub shard: ShardId,
    pub outcome: ShardOutcome,
}

/// Drives one admitted shard through execute, verify, and publish.
///
/// Whatever happens in between, the ledger reservation is released exactly
/// when the shard reaches a terminal state; release is not gated on the
/// outcome being deliverable.
pub struct JobRunner {
    host_id: String,
    executor: Arc<dyn Executor>,
    verifier: Arc<dyn Verifier>,
    publisher: Arc<dyn Publisher>,
    ledger: Arc<CapacityLedger>,
    parallel: Option<Arc<Semaphore>>,
}

impl JobRunner {
    pub fn new(
        host_id: String,
        executor: Arc<dyn Executor>,
        verifier: Arc<dyn Verifier>,
        publisher: Arc<dyn Publisher>,
        ledger: Arc<CapacityLedger>,
        max_parallel_jobs: Option<usize>,
    ) -> Self {
        Self {
            host_id,
            executor,
            verifier,
            publisher,
            ledger,
            parallel: max_parallel_jobs.map(|cap| Arc::new(Semaphore::new(cap))),
        }
    }

    /// Run a shard that already holds a ledger reservation.
    pub async fn run_shard(&self, ctx: CancellationToken, shard: Shard) -> ShardReport {
        let shard_id = shard.id();

        let _permit = match &self.parallel {
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        };

        let outcome = match self.drive(&ctx, &shard).await {
            Ok(spec) => {
                tracing::info!(shard = %shard_id, cid = %spec.cid, "Shard published");
                ShardOutcome::Published(spec)
            }
            Err((stage, err)) => {
                tracing::warn!(
                    shard = %shard_id,
                    stage = %stage,
                    kind = err.kind(),
                    error = %err,
                    "Shard failed"
                );
                ShardOutcome::Failed {
                    stage,
                    kind: err.kind(),
                    reason: err.to_string(),
                }
            }
        };

        // Terminal state reached: the reservation goes away no matter what.
        self.ledger.release(&shard_id);

        ShardReport {
            shard: shard_id,
            outcome,
        }
    }

    async fn drive(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
    ) -> std::result::Result<PublishSpec, (Stage, NodeError)> {
        let shard_id = shard.id();

        if ctx.is_cancelled() {
            return Err((Stage::Execute, NodeError::Cancelled));
        }
        tracing::debug!(shard = %shard_id, "Shard running");
        let execution = self
            .executor
            .run(ctx, shard)
            .await
            .map_err(|err| (Stage::Execute, err))?;
        if execution.exit_code != 0 {
            let stderr = execution.stderr.trim();
            let reason = if stderr.is_empty() {
                format!("exit code {}", execution.exit_code)
            } else {
                format!("exit code {}: {}", execution.exit_code, stderr)
            };
            return Err((Stage::Execute, NodeError::ExecutorFailed(reason)));
        }

        match self
            .verifier
            .verify(ctx, shard, &execution)
            .await
            .map_err(|err| (Stage::Verify, err))?
        {
            Verdict::Accepted => {}
            Verdict::Rejected(reason) => {
                return Err((Stage::Verify, NodeError::VerifierRejected(reason)));
            }
        }
        tracing::debug!(shard = %shard_id, "Shard verified");

        let result_dir = tempfile::tempdir().map_err(|err| (Stage::Publish, err.into()))?;
        write_result_files(result_dir.path(), &execution)
            .await
            .map_err(|err| (Stage::Publish, err))?;

        let spec = self
            .publisher
            .publish_shard_result(ctx, shard, &self.host_id, result_dir.path())
            .await
            .map_err(|err| (Stage::Publish, err))?;
        if !spec.is_complete() {
            return Err((
                Stage::Publish,
                NodeError::MalformedResponse("publish spec is missing a cid or name".to_string()),
            ));
        }
        Ok(spec)
    }
}

async fn write_result_files(
    dir: &std::path::Path,
    execution: &crate::worker::executor::ExecutionResult,
) -> crate::error::Result<()> {
    tokio::fs::write(dir.join("stdout"), &execution.stdout).await?;
    tokio::fs::write(dir.join("stderr"), &execution.stderr).await?;
    tokio::fs::write(dir.join("exitCode"), execution.exit_code.to_string()).await?;
    Ok(())
}
