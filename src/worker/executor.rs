use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::SandboxConfig;
use crate::error::{NodeError, Result};
use crate::job::Shard;

/// What a shard execution produced.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    pub fn success(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Runs one shard to completion inside whatever sandbox the engine
/// provides.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, ctx: &CancellationToken, shard: &Shard) -> Result<ExecutionResult>;
}

/// Executes shards in a docker container with cpu/memory limits derived
/// from the shard's effective resources.
#[derive(Debug, Clone, Default)]
pub struct DockerExecutor {
    sandbox: SandboxConfig,
}

impl DockerExecutor {
    pub fn new(sandbox: SandboxConfig) -> Self {
        Self { sandbox }
    }

    fn build_args(&self, shard: &Shard) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if self.sandbox.network_disabled {
            args.push("--network=none".to_string());
        }

        let resources = shard.job.resources;
        if resources.cpu_millicores > 0 {
            args.push(format!(
                "--cpus={}",
                resources.cpu_millicores as f64 / 1000.0
            ));
        }
        if resources.memory_bytes > 0 {
            args.push(format!("--memory={}b", resources.memory_bytes));
        }

        args.push("--cap-drop=ALL".to_string());
        args.push("--security-opt=no-new-privileges".to_string());
        args.push("--read-only".to_string());

        args.push(self.sandbox.image.clone());
        args.extend(shard.job.entrypoint.iter().cloned());
        args
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn run(&self, ctx: &CancellationToken, shard: &Shard) -> Result<ExecutionResult> {
        let shard_id = shard.id();
        let args = self.build_args(shard);
        tracing::info!(shard = %shard_id, image = %self.sandbox.image, "Executing shard in docker");

        let child = Command::new("docker")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::select! {
            _ = ctx.cancelled() => {
                tracing::info!(shard = %shard_id, "Execution cancelled, killing container");
                return Err(NodeError::Cancelled);
            }
            output = child.wait_with_output() => output?,
        };

        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
