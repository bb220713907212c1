use std::path::Path;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::StorageDaemonConfig;
use crate::error::{NodeError, Result};

/// Extract the host and port for HTTP dialing from a multiaddress such as
/// `/ip4/127.0.0.1/tcp/5001` or `/dns4/daemon.local/tcp/5001`.
pub fn multiaddr_to_host_port(address: &str) -> Result<(String, u16)> {
    let mut parts = address.split('/');
    if parts.next() != Some("") {
        return Err(NodeError::InvalidConfiguration(format!(
            "multiaddress {:?} must start with '/'",
            address
        )));
    }
    let mut host = None;
    let mut port = None;
    while let Some(protocol) = parts.next() {
        match protocol {
            "ip4" | "ip6" | "dns" | "dns4" | "dns6" | "dnsaddr" => {
                host = parts.next().map(str::to_string);
            }
            "tcp" => {
                port = parts.next().and_then(|p| p.parse::<u16>().ok());
            }
            // p2p suffixes and the like are not needed for dialing
            _ => {
                parts.next();
            }
        }
    }
    match (host, port) {
        (Some(host), Some(port)) if !host.is_empty() => Ok((host, port)),
        _ => Err(NodeError::InvalidConfiguration(format!(
            "multiaddress {:?} has no dialable host and tcp port",
            address
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct LocalAddrsResponse {
    #[serde(rename = "Strings", default)]
    strings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PeersResponse {
    #[serde(rename = "Peers", default)]
    peers: Vec<PeerInfo>,
}

#[derive(Debug, Deserialize)]
pub struct PeerInfo {
    #[serde(rename = "Peer")]
    pub peer: String,
    #[serde(rename = "Addr", default)]
    pub addr: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProvidersLine {
    #[serde(rename = "Responses", default)]
    responses: Vec<ProviderInfo>,
}

#[derive(Debug, Deserialize)]
struct ProviderInfo {
    #[serde(rename = "ID")]
    id: String,
}

/// HTTP client for the content-addressed storage daemon.
///
/// The daemon is addressed by multiaddress; the client dials its HTTP API
/// over the derived host:port.
pub struct IpfsClient {
    config: StorageDaemonConfig,
    base_url: String,
    client: reqwest::Client,
}

impl IpfsClient {
    pub fn new(config: StorageDaemonConfig) -> Result<Self> {
        let (host, port) = multiaddr_to_host_port(&config.api_address)?;
        Ok(Self {
            config,
            base_url: format!("http://{}:{}", host, port),
            client: reqwest::Client::new(),
        })
    }

    pub fn api_address(&self) -> &str {
        &self.config.api_address
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn api_post(&self, ctx: &CancellationToken, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}/api/v0/{}", self.base_url, path);
        let request = self.client.post(&url).send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response?,
        };
        if !response.status().is_success() {
            return Err(NodeError::MalformedResponse(format!(
                "daemon returned {} for {}",
                response.status(),
                path
            )));
        }
        Ok(response)
    }

    /// The daemon's local listen multiaddresses.
    pub async fn local_addrs(&self, ctx: &CancellationToken) -> Result<Vec<String>> {
        let response = self.api_post(ctx, "swarm/addrs/local").await?;
        let body: LocalAddrsResponse = response
            .json()
            .await
            .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;
        Ok(body.strings)
    }

    /// Currently connected swarm peers.
    pub async fn peers(&self, ctx: &CancellationToken) -> Result<Vec<PeerInfo>> {
        let response = self.api_post(ctx, "swarm/peers").await?;
        let body: PeersResponse = response
            .json()
            .await
            .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;
        Ok(body.peers)
    }

    /// The daemon's own peer id.
    pub async fn peer_id(&self, ctx: &CancellationToken) -> Result<String> {
        let response = self.api_post(ctx, "id").await?;
        let body: IdResponse = response
            .json()
            .await
            .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;
        Ok(body.id)
    }

    /// The swarm addresses other nodes should dial: each local address with
    /// the peer id appended.
    pub async fn swarm_addresses(&self, ctx: &CancellationToken) -> Result<Vec<String>> {
        let addrs = self.local_addrs(ctx).await?;
        let peer_id = self.peer_id(ctx).await?;
        Ok(addrs
            .into_iter()
            .map(|addr| format!("{}/p2p/{}", addr, peer_id))
            .collect())
    }

    /// Peer ids of providers for `cid`, per the DHT.
    pub async fn find_providers(&self, ctx: &CancellationToken, cid: &str) -> Result<Vec<String>> {
        let response = self
            .api_post(ctx, &format!("dht/findprovs?arg={}", cid))
            .await?;
        // The daemon streams newline-delimited JSON events.
        let body = response.text().await?;
        let mut providers = Vec::new();
        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let event: ProvidersLine = serde_json::from_str(line)
                .map_err(|err| NodeError::MalformedResponse(err.to_string()))?;
            providers.extend(event.responses.into_iter().map(|p| p.id));
        }
        Ok(providers)
    }

    /// Does this daemon itself provide `cid`?
    pub async fn has_cid_locally(&self, ctx: &CancellationToken, cid: &str) -> Result<bool> {
        let peer_id = self.peer_id(ctx).await?;
        let providers = self.find_providers(ctx, cid).await?;
        Ok(providers.contains(&peer_id))
    }

    /// Download `cid` as a tar archive into `target_dir` and extract it.
    ///
    /// The body is streamed to disk until EOF, bounded by the configured
    /// download timeout.
    pub async fn download_tar(
        &self,
        ctx: &CancellationToken,
        target_dir: &Path,
        cid: &str,
    ) -> Result<()> {
        let url = format!("{}/api/v0/get?arg={}&archive=true", self.base_url, cid);
        let request = self
            .client
            .post(&url)
            .timeout(self.config.download_timeout)
            .send();
        let mut response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response?,
        };
        if !response.status().is_success() {
            return Err(NodeError::MalformedResponse(format!(
                "daemon returned {} for get",
                response.status()
            )));
        }

        let tar_path = target_dir.join(format!("{}.tar", cid));
        tracing::debug!(cid = %cid, path = %tar_path.display(), "Writing cid tar file");
        let mut file = tokio::fs::File::create(&tar_path).await?;
        while let Some(chunk) = response.chunk().await? {
            if ctx.is_cancelled() {
                return Err(NodeError::Cancelled);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        let output = Command::new("tar")
            .arg("-xf")
            .arg(&tar_path)
            .arg("-C")
            .arg(target_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(NodeError::Io(std::io::Error::other(format!(
                "tar extract failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        tokio::fs::remove_file(&tar_path).await?;
        tracing::debug!(cid = %cid, "Extracted tar file");
        Ok(())
    }

    /// Add a directory to the daemon, returning the root cid.
    // TODO: switch to the daemon's multipart add endpoint so this stops
    // shelling out to the CLI.
    pub async fn add_dir(&self, ctx: &CancellationToken, source_dir: &Path) -> Result<String> {
        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            output = Command::new("ipfs")
                .arg("--api")
                .arg(self.api_address())
                .arg("add")
                .arg("-rq")
                .arg(source_dir)
                .output() => output?,
        };
        if !output.status.success() {
            return Err(NodeError::Io(std::io::Error::other(format!(
                "ipfs add failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| NodeError::MalformedResponse("no cid returned from add".to_string()))
    }
}
