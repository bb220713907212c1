use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::admission::ledger::LedgerSnapshot;
use crate::config::JobSelectionPolicy;
use crate::error::{NodeError, Result};
use crate::job::{JobSpec, ResourceProfile};
use crate::resources::Resources;

/// The policy's verdict on a candidate job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Accept,
    /// The node could run this job, just not right now. The candidate goes
    /// to the bid queue.
    RejectTransient(String),
    /// The node will never bid on this job; it must not be re-queued.
    RejectTerminal(String),
}

/// Body POSTed to the external probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeData {
    pub job: JobSpec,
    pub resources: ProbeResources,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeResources {
    pub job: Resources,
    #[serde(rename = "systemTotal")]
    pub system_total: Resources,
}

/// Decides whether the node is willing to bid on a candidate job.
///
/// Gates run in order and short-circuit: per-job arithmetic, total
/// envelope, current capacity, then the optional external HTTP probe.
pub struct SelectionPolicy {
    policy: JobSelectionPolicy,
    client: reqwest::Client,
}

impl SelectionPolicy {
    pub fn new(policy: JobSelectionPolicy) -> Self {
        Self {
            policy,
            client: reqwest::Client::new(),
        }
    }

    pub async fn select(
        &self,
        ctx: &CancellationToken,
        job: &JobSpec,
        profile: &ResourceProfile,
        snapshot: &LedgerSnapshot,
    ) -> Result<Selection> {
        // Per-job arithmetic gate. An unspecified dimension cannot preempt a
        // bounded one, so a zero-declared dimension against a non-zero limit
        // rejects outright.
        let per_job = self.policy.per_job_limits;
        if !per_job.is_zero() {
            if per_job.cpu_millicores > 0 && profile.declared.cpu_millicores == 0 {
                return Ok(Selection::RejectTerminal(
                    "job cpu unspecified but a per-job cpu limit is set".to_string(),
                ));
            }
            if per_job.memory_bytes > 0 && profile.declared.memory_bytes == 0 {
                return Ok(Selection::RejectTerminal(
                    "job memory unspecified but a per-job memory limit is set".to_string(),
                ));
            }
            if !profile.effective.within_limits(per_job) {
                return Ok(Selection::RejectTerminal(format!(
                    "job wants {} but the per-job limit is {}",
                    profile.effective, per_job
                )));
            }
        }

        // Envelope gate: could the node ever run it? Failure is permanent
        // for this (job, node) pair.
        if !profile.effective.within_limits(profile.system_total) {
            return Ok(Selection::RejectTerminal(format!(
                "job wants {} but the node total is {}",
                profile.effective, profile.system_total
            )));
        }

        // Capacity gate: does it fit right now?
        if !snapshot.fits(profile.effective) {
            return Ok(Selection::RejectTransient(format!(
                "job wants {} but only {} remains",
                profile.effective, snapshot.remaining
            )));
        }

        // External probe, if configured. The policy respects the oracle:
        // anything other than a 2xx is terminal.
        if let Some(url) = &self.policy.probe_url {
            return self.probe(ctx, url, job, profile).await;
        }

        Ok(Selection::Accept)
    }

    async fn probe(
        &self,
        ctx: &CancellationToken,
        url: &str,
        job: &JobSpec,
        profile: &ResourceProfile,
    ) -> Result<Selection> {
        let body = ProbeData {
            job: job.clone(),
            resources: ProbeResources {
                job: profile.effective,
                system_total: profile.system_total,
            },
        };
        let request = self
            .client
            .post(url)
            .timeout(self.policy.probe_timeout)
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            response = request => response,
        };

        match response {
            Ok(response) if response.status().is_success() => Ok(Selection::Accept),
            Ok(response) => {
                tracing::info!(job_id = %job.id, status = %response.status(), url, "Probe rejected job");
                Ok(Selection::RejectTerminal(format!(
                    "probe returned {}",
                    response.status()
                )))
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, url, "Probe transport error");
                Ok(Selection::RejectTerminal(format!("probe failed: {}", err)))
            }
        }
    }
}
