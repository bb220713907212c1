use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::resources::Resources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Docker,
    Noop,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Docker => write!(f, "docker"),
            EngineKind::Noop => write!(f, "noop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherKind {
    Ipfs,
    Estuary,
}

/// An immutable job descriptor. Nothing mutates a descriptor after
/// admission; the runner and queue share it read-only behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub engine: EngineKind,
    pub verifier: VerifierKind,
    pub publisher: PublisherKind,
    /// Entrypoint handed through to the executor unchanged.
    pub entrypoint: Vec<String>,
    /// Declared per-shard resources. Zero components mean "unspecified".
    pub resources: Resources,
    /// Number of distinct shard executions the author wants.
    pub concurrency: usize,
    /// Shards per execution, from the job spec.
    pub shard_count: usize,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, engine: EngineKind) -> Self {
        Self {
            id: id.into(),
            engine,
            verifier: VerifierKind::Noop,
            publisher: PublisherKind::Ipfs,
            entrypoint: Vec::new(),
            resources: Resources::default(),
            concurrency: 1,
            shard_count: 1,
        }
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_entrypoint(mut self, entrypoint: Vec<String>) -> Self {
        self.entrypoint = entrypoint;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn total_shards(&self) -> usize {
        self.concurrency.max(1) * self.shard_count.max(1)
    }

    /// Dense shard descriptors `[0, total_shards)` over this job.
    pub fn shards(self: &Arc<Self>) -> Vec<Shard> {
        (0..self.total_shards())
            .map(|index| Shard {
                job: Arc::clone(self),
                index,
            })
            .collect()
    }
}

/// Uniquely identifies a unit of executable work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    pub job_id: String,
    pub index: usize,
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.job_id, self.index)
    }
}

/// A shard together with its parent descriptor.
#[derive(Debug, Clone)]
pub struct Shard {
    pub job: Arc<JobSpec>,
    pub index: usize,
}

impl Shard {
    pub fn id(&self) -> ShardId {
        ShardId {
            job_id: self.job.id.clone(),
            index: self.index,
        }
    }
}

/// The enriched record the selection policy reasons about. The policy never
/// sees a raw job alone.
#[derive(Debug, Clone, Copy)]
pub struct ResourceProfile {
    /// What the job asked for, zero meaning unspecified.
    pub declared: Resources,
    /// Declared, with unspecified dimensions substituted by the node's
    /// configured defaults.
    pub effective: Resources,
    /// The node's total capacity envelope.
    pub system_total: Resources,
}

impl ResourceProfile {
    pub fn new(declared: Resources, defaults: Resources, system_total: Resources) -> Self {
        let effective = Resources {
            cpu_millicores: if declared.cpu_millicores == 0 {
                defaults.cpu_millicores
            } else {
                declared.cpu_millicores
            },
            memory_bytes: if declared.memory_bytes == 0 {
                defaults.memory_bytes
            } else {
                declared.memory_bytes
            },
        };
        Self {
            declared,
            effective,
            system_total,
        }
    }
}
