use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::Shard;
use crate::worker::executor::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

/// Checks a shard's execution result before it may be published.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
        result: &ExecutionResult,
    ) -> Result<Verdict>;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVerifier;

#[async_trait]
impl Verifier for NoopVerifier {
    async fn verify(
        &self,
        _ctx: &CancellationToken,
        _shard: &Shard,
        _result: &ExecutionResult,
    ) -> Result<Verdict> {
        Ok(Verdict::Accepted)
    }
}
