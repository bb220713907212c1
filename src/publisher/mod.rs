//! Content publishing: package a shard's outputs and ship them to
//! content-addressed storage, with multi-endpoint failover and a
//! best-effort pin sidecar.

pub mod car;
pub mod estuary;
pub mod ipfs;
pub mod pinner;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::job::{Shard, ShardId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageSource {
    Ipfs,
    Estuary,
}

impl std::fmt::Display for StorageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageSource::Ipfs => write!(f, "ipfs"),
            StorageSource::Estuary => write!(f, "estuary"),
        }
    }
}

/// The content-address record returned by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSpec {
    pub cid: String,
    pub name: String,
    pub source: StorageSource,
}

impl PublishSpec {
    /// A success outcome must carry both a cid and a name; anything less is
    /// a failure regardless of transport status.
    pub fn is_complete(&self) -> bool {
        !self.cid.is_empty() && !self.name.is_empty()
    }
}

/// Result name stamped into the publish spec.
pub fn published_name(shard: &ShardId, host_id: &str) -> String {
    format!(
        "job-{}-shard-{}-host-{}",
        shard.job_id, shard.index, host_id
    )
}

/// Delivers a shard's result directory to content-addressed storage.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Is the backing service reachable and usable from this node?
    async fn is_installed(&self, ctx: &CancellationToken) -> Result<bool>;

    async fn publish_shard_result(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
        host_id: &str,
        result_path: &Path,
    ) -> Result<PublishSpec>;
}
