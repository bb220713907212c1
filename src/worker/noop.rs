use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::{JobSpec, Shard};
use crate::worker::executor::{ExecutionResult, Executor};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// User-supplied hook invoked in place of real execution. Returns the
/// shard's stdout.
pub type JobHandler =
    Arc<dyn Fn(CancellationToken, Arc<JobSpec>) -> HandlerFuture + Send + Sync>;

/// An executor that does nothing, successfully.
///
/// With a [`JobHandler`] installed it becomes the seam the concurrency
/// tests drive: the handler observes each admission and controls how long
/// the shard appears to run.
#[derive(Clone, Default)]
pub struct NoopExecutor {
    handler: Option<JobHandler>,
}

impl NoopExecutor {
    pub fn new() -> Self {
        Self { handler: None }
    }

    pub fn with_handler(handler: JobHandler) -> Self {
        Self {
            handler: Some(handler),
        }
    }
}

#[async_trait]
impl Executor for NoopExecutor {
    async fn run(&self, ctx: &CancellationToken, shard: &Shard) -> Result<ExecutionResult> {
        match &self.handler {
            Some(handler) => {
                let stdout = handler(ctx.clone(), Arc::clone(&shard.job)).await?;
                Ok(ExecutionResult::success(stdout))
            }
            None => Ok(ExecutionResult::success(String::new())),
        }
    }
}
