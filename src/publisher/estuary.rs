use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::UploadGatewayConfig;
use crate::error::{NodeError, Result};
use crate::job::Shard;
use crate::publisher::car::CarPacker;
use crate::publisher::{published_name, PublishSpec, Publisher, StorageSource};

/// Overrides the gateway base URL for read/config traffic.
pub const READ_API_URL_ENV: &str = "READ_API_URL";
/// When set, forces this single URL as the upload target and skips the
/// config endpoint entirely.
pub const WRITE_API_URL_ENV: &str = "WRITE_API_URL";

/// Partial shape of the gateway's config endpoint response.
#[derive(Debug, Deserialize)]
struct GatewayConfig {
    settings: GatewaySettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewaySettings {
    #[serde(default)]
    content_adding_disabled: bool,
    #[serde(default)]
    upload_endpoints: Vec<String>,
}

/// Ships CAR-packaged shard results to one of several upload endpoints,
/// trying them in randomized order until one succeeds.
pub struct EstuaryPublisher {
    config: UploadGatewayConfig,
    car: Arc<dyn CarPacker>,
    client: reqwest::Client,
}

impl EstuaryPublisher {
    pub fn new(config: UploadGatewayConfig, car: Arc<dyn CarPacker>) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(NodeError::InvalidConfiguration(
                "an upload gateway api key is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            car,
            client: reqwest::Client::new(),
        })
    }

    fn gateway_url(&self) -> String {
        std::env::var(READ_API_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.config.gateway_url.clone())
    }

    /// Resolve the current set of upload endpoints.
    ///
    /// The list contains only successfully parsed URLs; malformed entries
    /// are logged and skipped.
    async fn upload_endpoints(&self, ctx: &CancellationToken) -> Result<Vec<Url>> {
        if let Some(forced) = std::env::var(WRITE_API_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty())
        {
            tracing::debug!(url = %forced, "Using env-defined upload endpoint");
            let parsed = Url::parse(&forced)
                .map_err(|err| NodeError::InvalidConfiguration(format!("{}: {}", forced, err)))?;
            return Ok(vec![parsed]);
        }

        let config_url = format!(
            "{}{}",
            self.gateway_url().trim_end_matches('/'),
            self.config.config_path
        );
        let request = self
            .client
            .get(&config_url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.upload_timeout)
            .send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response?,
        };
        if !response.status().is_success() {
            return Err(NodeError::MalformedResponse(format!(
                "config endpoint returned {}",
                response.status()
            )));
        }
        // The whole body is read to completion before parsing.
        let config: GatewayConfig = response
            .json()
            .await
            .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;

        if config.settings.content_adding_disabled {
            return Err(NodeError::UploadDisabled);
        }

        let mut endpoints = Vec::new();
        for raw in &config.settings.upload_endpoints {
            match Url::parse(raw) {
                Ok(url) => endpoints.push(url),
                Err(err) => {
                    tracing::warn!(url = %raw, error = %err, "Upload endpoint URL malformed, skipping");
                }
            }
        }
        if endpoints.is_empty() {
            return Err(NodeError::NoEndpointsAvailable);
        }
        Ok(endpoints)
    }

    async fn try_upload(
        &self,
        ctx: &CancellationToken,
        endpoint: &Url,
        car_path: &Path,
    ) -> Result<()> {
        // The CAR file is re-read fresh for every attempt.
        let bytes = tokio::fs::read(car_path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("results.car")
            .mime_str("application/vnd.ipld.car")
            .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;
        let form = reqwest::multipart::Form::new().part("data", part);

        let upload_url = format!("{}/content/add-car", endpoint.as_str().trim_end_matches('/'));
        let request = self
            .client
            .post(&upload_url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.upload_timeout)
            .multipart(form)
            .send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response?,
        };
        if !response.status().is_success() {
            return Err(NodeError::MalformedResponse(format!(
                "endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Publisher for EstuaryPublisher {
    async fn is_installed(&self, ctx: &CancellationToken) -> Result<bool> {
        let url = format!("{}/collections", self.gateway_url().trim_end_matches('/'));
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .timeout(self.config.upload_timeout)
            .send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response?,
        };
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn publish_shard_result(
        &self,
        ctx: &CancellationToken,
        shard: &Shard,
        host_id: &str,
        result_path: &Path,
    ) -> Result<PublishSpec> {
        let shard_id = shard.id();
        tracing::info!(shard = %shard_id, "Publishing shard results to the upload gateway");

        let scratch = tempfile::tempdir()?;
        let car_path = scratch.path().join("results.car");
        let cid = self.car.create_car(ctx, result_path, &car_path).await?;

        let mut endpoints = self.upload_endpoints(ctx).await?;
        // Fresh permutation per publish so the load spreads across hosts.
        endpoints.shuffle(&mut rand::thread_rng());

        let mut transcript = Vec::new();
        for endpoint in &endpoints {
            match self.try_upload(ctx, endpoint, &car_path).await {
                Ok(()) => {
                    return Ok(PublishSpec {
                        cid,
                        name: published_name(&shard_id, host_id),
                        source: StorageSource::Estuary,
                    });
                }
                Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
                Err(err) => {
                    tracing::error!(endpoint = %endpoint, error = %err, "Upload attempt failed");
                    transcript.push(format!("{}: {}", endpoint, err));
                }
            }
        }
        Err(NodeError::AllEndpointsFailed(transcript.join("; ")))
    }
}
