use std::time::Duration;

use crate::resources::Resources;

/// Top-level configuration for a compute node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Stable identifier for this host, stamped into published result names.
    pub host_id: String,
    /// Total capacity envelope. A zero component means no limit on that
    /// dimension, never "no capacity".
    pub total_limits: Resources,
    /// Substituted into a job's unspecified resource dimensions before the
    /// selection policy sees it.
    pub default_job_resources: Resources,
    pub job_selection_policy: JobSelectionPolicy,
    pub bid_queue: BidQueueConfig,
    /// Cap on concurrently running shard runners, independent of resource
    /// arithmetic. `None` means purely resource-bound.
    pub max_parallel_jobs: Option<usize>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host_id: "local".to_string(),
            total_limits: Resources::default(),
            default_job_resources: Resources::default(),
            job_selection_policy: JobSelectionPolicy::default(),
            bid_queue: BidQueueConfig::default(),
            max_parallel_jobs: None,
        }
    }
}

impl NodeConfig {
    pub fn with_total_limits(mut self, limits: Resources) -> Self {
        self.total_limits = limits;
        self
    }

    pub fn with_selection_policy(mut self, policy: JobSelectionPolicy) -> Self {
        self.job_selection_policy = policy;
        self
    }
}

/// Controls whether this node bids on a candidate job.
#[derive(Debug, Clone)]
pub struct JobSelectionPolicy {
    /// Per-job ceiling. Zero components mean no bound on that dimension.
    pub per_job_limits: Resources,
    /// Optional external oracle. When set, candidate jobs are POSTed here
    /// and anything other than a 2xx response rejects the bid.
    pub probe_url: Option<String>,
    pub probe_timeout: Duration,
}

impl Default for JobSelectionPolicy {
    fn default() -> Self {
        Self {
            per_job_limits: Resources::default(),
            probe_url: None,
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl JobSelectionPolicy {
    pub fn with_per_job_limits(mut self, limits: Resources) -> Self {
        self.per_job_limits = limits;
        self
    }

    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }
}

/// Retention settings for transiently-rejected bids.
#[derive(Debug, Clone)]
pub struct BidQueueConfig {
    /// Entries older than this are evicted unbid.
    pub ttl: Duration,
    /// When full, a new transient rejection evicts the oldest entry.
    pub max_queued: usize,
}

impl Default for BidQueueConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_queued: 256,
        }
    }
}

/// Sandbox settings for the docker executor.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub image: String,
    pub network_disabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "ubuntu:22.04".to_string(),
            network_disabled: true,
        }
    }
}

/// Settings for the multi-endpoint upload gateway and the pin sidecar.
#[derive(Debug, Clone)]
pub struct UploadGatewayConfig {
    pub api_key: String,
    /// Base URL for read/config traffic. `READ_API_URL` overrides it.
    pub gateway_url: String,
    /// Path of the config endpoint on the gateway.
    pub config_path: String,
    /// Per-endpoint upload attempt timeout.
    pub upload_timeout: Duration,
    /// Timeout for a single pin request.
    pub pin_timeout: Duration,
    /// Cap on detached pin tasks; overflow pins are dropped with a warning.
    pub max_pin_tasks: usize,
}

impl Default for UploadGatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            gateway_url: "https://api.estuary.tech".to_string(),
            config_path: "/viewer".to_string(),
            upload_timeout: Duration::from_secs(30),
            pin_timeout: Duration::from_secs(60),
            max_pin_tasks: 64,
        }
    }
}

impl UploadGatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }
}

/// Settings for the storage daemon HTTP client.
#[derive(Debug, Clone)]
pub struct StorageDaemonConfig {
    /// Multiaddress of the daemon's HTTP API, e.g. `/ip4/127.0.0.1/tcp/5001`.
    pub api_address: String,
    /// Timeout for result downloads in integration contexts.
    pub download_timeout: Duration,
}

impl Default for StorageDaemonConfig {
    fn default() -> Self {
        Self {
            api_address: "/ip4/127.0.0.1/tcp/5001".to_string(),
            download_timeout: Duration::from_secs(60),
        }
    }
}
