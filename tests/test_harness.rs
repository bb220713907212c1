//! Shared helpers for compute node integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use minnow::config::NodeConfig;
use minnow::error::Result;
use minnow::job::Shard;
use minnow::node::ComputeNode;
use minnow::publisher::{published_name, PublishSpec, Publisher, StorageSource};
use minnow::resources::Resources;
use minnow::verifier::NoopVerifier;
use minnow::worker::{Executor, JobHandler, NoopExecutor};

/// Parse a `(cpu, memory)` pair, panicking on bad test input.
pub fn resources(cpu: &str, memory: &str) -> Resources {
    Resources::parse(cpu, memory).expect("test resources must parse")
}

/// A publisher that records every publish and returns a canned spec.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn is_installed(&self, _ctx: &CancellationToken) -> Result<bool> {
        Ok(true)
    }

    async fn publish_shard_result(
        &self,
        _ctx: &CancellationToken,
        shard: &Shard,
        host_id: &str,
        _result_path: &Path,
    ) -> Result<PublishSpec> {
        let shard_id = shard.id();
        self.published.lock().push(shard_id.to_string());
        Ok(PublishSpec {
            cid: "bafytestcid".to_string(),
            name: published_name(&shard_id, host_id),
            source: StorageSource::Ipfs,
        })
    }
}

/// Build and start a node wired with the noop executor and a recording
/// publisher.
pub fn test_node(
    config: NodeConfig,
    handler: Option<JobHandler>,
) -> (Arc<ComputeNode>, CancellationToken, Arc<RecordingPublisher>) {
    let ctx = CancellationToken::new();
    let executor: Arc<dyn Executor> = match handler {
        Some(handler) => Arc::new(NoopExecutor::with_handler(handler)),
        None => Arc::new(NoopExecutor::new()),
    };
    let publisher = Arc::new(RecordingPublisher::default());
    let node = ComputeNode::new(
        config,
        executor,
        Arc::new(NoopVerifier),
        Arc::clone(&publisher) as _,
        ctx.clone(),
    );
    node.start();
    (node, ctx, publisher)
}

/// Tracks concurrent shard executions through the noop handler seam.
#[derive(Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    max_seen: AtomicUsize,
    completed: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that "runs" each shard for `hold` and records how many
    /// shards overlapped. It returns early if the node shuts down.
    pub fn handler(self: &Arc<Self>, hold: Duration) -> JobHandler {
        let tracker = Arc::clone(self);
        Arc::new(move |ctx, _job| {
            let tracker = Arc::clone(&tracker);
            Box::pin(async move {
                let now = tracker.current.fetch_add(1, Ordering::SeqCst) + 1;
                tracker.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(hold) => {}
                }
                tracker.current.fetch_sub(1, Ordering::SeqCst);
                tracker.completed.fetch_add(1, Ordering::SeqCst);
                Ok(String::new())
            })
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Poll `condition` until it returns true or the timeout elapses.
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

pub async fn assert_eventually<F, Fut>(condition: F, timeout: Duration, message: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = wait_for(condition, timeout).await;
    assert!(result, "{}", message);
}
