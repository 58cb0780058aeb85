//! Rendering a parameter file into a flashable partition image.

use crate::error::{DeviceError, DeviceResult};
use crate::tool::ToolCommand;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Turns a parameter file into a partition binary of a fixed size.
#[async_trait]
pub trait BinaryRenderer: Send + Sync {
    async fn render(&self, params_csv: &Path, output: &Path, size: u32) -> DeviceResult<()>;
}

/// [`BinaryRenderer`] backed by the partition generator tool.
#[derive(Debug, Clone)]
pub struct NvsPartitionGen {
    command: ToolCommand,
}

impl NvsPartitionGen {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl BinaryRenderer for NvsPartitionGen {
    async fn render(&self, params_csv: &Path, output: &Path, size: u32) -> DeviceResult<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = [
            "generate".to_string(),
            params_csv.display().to_string(),
            output.display().to_string(),
            format!("{size:#x}"),
        ];
        let out = self
            .command
            .run(&args)
            .await
            .map_err(|e| DeviceError::Render(format!("cannot run {}: {e}", self.command)))?;
        if !out.success {
            return Err(DeviceError::Render(out.failure("partition generator")));
        }
        if !output.is_file() {
            return Err(DeviceError::Render(format!(
                "partition generator produced no {}",
                output.display()
            )));
        }
        info!(binary = %output.display(), "rendered configuration binary");
        Ok(())
    }
}
