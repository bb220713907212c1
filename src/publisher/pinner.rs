use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::UploadGatewayConfig;
use crate::error::Result;
use crate::job::Shard;
use crate::publisher::estuary::READ_API_URL_ENV;
use crate::publisher::{PublishSpec, Publisher};

#[derive(Debug, Serialize)]
struct PinRequest {
    cid: String,
    name: String,
}

/// Decorates a publisher with a best-effort pin to a higher-availability
/// service.
///
/// The pin request runs in a detached task whose only side effect is a log
/// line; the publish outcome handed back to the runner is fixed at the
/// inner publisher's success. Detached tasks are capped by a semaphore and
/// overflow pins are dropped with a warning.
pub struct PinningPublisher {
    inner: Arc<dyn Publisher>,
    config: UploadGatewayConfig,
    client: reqwest::Client,
    pin_permits: Arc<Semaphore>,
}

impl PinningPublisher {
    pub fn new(inner: Arc<dyn Publisher>, config: UploadGatewayConfig) -> Self {
        let permits = config.max_pin_tasks;
        Self {
            inner,
            config,
            client: reqwest::Client::new(),
            pin_permits: Arc::new(Semaphore::new(permits)),
        }
    }

    fn gateway_url(&self) -> String {
        std::env::var(READ_API_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.config.gateway_url.clone())
    }

    fn spawn_pin(&self, ctx: &CancellationToken, spec: &PublishSpec) {
        let permit = match Arc::clone(&self.pin_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(cid = %spec.cid, "Pin task pool exhausted, dropping pin");
                return;
            }
        };

        let ctx = ctx.clone();
        let client = self.client.clone();
        let api_key = self.config.api_key.clone();
        let pin_timeout = self.config.pin_timeout;
        let url = format!("{}/pinning/pins", self.gateway_url().trim_end_matches('/'));
        let cid = spec.cid.clone();
        let name = spec.name.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if cid.is_empty() || name.is_empty() {
                tracing::error!(cid = %cid, name = %name, "Publish spec missing cid or name, not pinning");
                return;
            }
            let request = client
                .post(&url)
                .bearer_auth(&api_key)
                .timeout(pin_timeout)
                .json(&PinRequest {
                    cid: cid.clone(),
                    name: name.clone(),
                })
                .send();
            let response = tokio::select! {
                _ = ctx.cancelled() => {
                    tracing::info!(cid = %cid, "Pin attempt cancelled");
                    return;
                }
                response = request => response,
            };
            match response {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(cid = %cid, name = %name, status = %response.status(), "Pinned cid");
                }
                Ok(response) => {
                    tracing::error!(cid = %cid, name = %name, status = %response.status(), "Pin attempt rejected");
                }
                Err(err) => {
                    tracing::error!(cid = %cid, name = %name, error = %err, "Pin attempt failed");
                }
            }
        });
    }
}

#[async_trait]
impl Publisher for PinningPublisher {
    async fn is_installed(&self, ctx: &CancellationToken) -> Result<bool> {
        self.inner.is_installed(ctx).await
    }

    async fn publish_shard_result(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
        host_id: &str,
        result_path: &Path,
    ) -> Result<PublishSpec> {
        let spec = self
            .inner
            .publish_shard_result(ctx, shard, host_id, result_path)
            .await?;
        self.spawn_pin(ctx, &spec);
        Ok(spec)
    }
}
