use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::ipfs::IpfsClient;
use crate::job::Shard;
use crate::publisher::car::CarPacker;
use crate::publisher::{published_name, PublishSpec, Publisher, StorageSource};

/// The primary publish path: package the result directory into a
/// single-root CAR and return its root CID.
pub struct IpfsPublisher {
    daemon: Arc<IpfsClient>,
    car: Arc<dyn CarPacker>,
}

impl IpfsPublisher {
    pub fn new(daemon: Arc<IpfsClient>, car: Arc<dyn CarPacker>) -> Self {
        Self { daemon, car }
    }
}

#[async_trait]
impl Publisher for IpfsPublisher {
    async fn is_installed(&self, ctx: &CancellationToken) -> Result<bool> {
        Ok(self.daemon.peer_id(ctx).await.is_ok())
    }

    async fn publish_shard_result(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
        host_id: &str,
        result_path: &Path,
    ) -> Result<PublishSpec> {
        let shard_id = shard.id();
        let scratch = tempfile::tempdir()?;
        let car_path = scratch.path().join("results.car");
        let cid = self.car.create_car(ctx, result_path, &car_path).await?;
        tracing::info!(shard = %shard_id, cid = %cid, "Published shard results");
        Ok(PublishSpec {
            cid,
            name: published_name(&shard_id, host_id),
            source: StorageSource::Ipfs,
        })
    }
}
