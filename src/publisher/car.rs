use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{NodeError, Result};

/// Packages a directory into a CAR archive with a single root.
///
/// The archive format itself belongs to the surrounding platform; this
/// core only needs the file on disk and the root CID back.
#[async_trait]
pub trait CarPacker: Send + Sync {
    async fn create_car(
        &self,
        ctx: &CancellationToken,
        source_dir: &Path,
        car_path: &Path,
    ) -> Result<String>;
}

/// Shells out to the platform's `car` utility.
#[derive(Debug, Clone)]
pub struct CarToolPacker {
    binary: String,
}

impl Default for CarToolPacker {
    fn default() -> Self {
        Self {
            binary: "car".to_string(),
        }
    }
}

impl CarToolPacker {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, ctx: &CancellationToken, args: &[&str]) -> Result<String> {
        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(NodeError::Cancelled),
            output = Command::new(&self.binary).args(args).output() => output?,
        };
        if !output.status.success() {
            return Err(NodeError::Io(std::io::Error::other(format!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl CarPacker for CarToolPacker {
    async fn create_car(
        &self,
        ctx: &CancellationToken,
        source_dir: &Path,
        car_path: &Path,
    ) -> Result<String> {
        let source = source_dir.to_string_lossy();
        let target = car_path.to_string_lossy();
        self.run(ctx, &["create", "--file", &target, &source]).await?;
        let cid = self.run(ctx, &["root", &target]).await?;
        if cid.is_empty() {
            return Err(NodeError::MalformedResponse(
                "car utility returned no root cid".to_string(),
            ));
        }
        Ok(cid)
    }
}
