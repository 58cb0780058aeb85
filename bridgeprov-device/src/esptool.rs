//! Adapter for the ROM bootloader flashing tool.
//!
//! Every operation is a separate tool run that opens the port, talks to the
//! bootloader and closes the port again when the process exits.

use crate::error::{DeviceError, DeviceResult};
use crate::identity::{parse_identity, ChipIdentity};
use crate::release::FlashMap;
use crate::tool::ToolCommand;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Default flashing baud rate.
pub const DEFAULT_BAUD: u32 = 460_800;

/// Reads the identity of the device on a port.
#[async_trait]
pub trait IdentityProbe: Send + Sync {
    async fn identify(&self, port: &str) -> DeviceResult<ChipIdentity>;
}

/// Writes a complete flash map to the device on a port.
#[async_trait]
pub trait Flasher: Send + Sync {
    async fn flash(&self, port: &str, map: &FlashMap) -> DeviceResult<()>;
}

/// Flashing tool invocation settings.
#[derive(Debug, Clone)]
pub struct Esptool {
    command: ToolCommand,
    baud: u32,
}

impl Esptool {
    pub fn new(command: ToolCommand, baud: u32) -> Self {
        Self { command, baud }
    }

    #[must_use]
    pub fn baud(&self) -> u32 {
        self.baud
    }

    fn port_args(&self, port: &str) -> Vec<String> {
        vec![
            "--port".to_string(),
            port.to_string(),
            "--baud".to_string(),
            self.baud.to_string(),
        ]
    }

    /// Dumps `size` bytes starting at `address` into `output`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Communication`] if the tool fails.
    pub async fn read_flash(
        &self,
        port: &str,
        address: u32,
        size: u32,
        output: &Path,
    ) -> DeviceResult<()> {
        let mut args = self.port_args(port);
        args.extend([
            "read_flash".to_string(),
            format!("{address:#x}"),
            format!("{size:#x}"),
            output.display().to_string(),
        ]);
        let out = self
            .command
            .run(&args)
            .await
            .map_err(|e| DeviceError::Communication(format!("cannot run {}: {e}", self.command)))?;
        if !out.success {
            return Err(DeviceError::Communication(out.failure("read_flash")));
        }
        debug!(port, address = %format!("{address:#x}"), size, "read flash region");
        Ok(())
    }
}

#[async_trait]
impl IdentityProbe for Esptool {
    async fn identify(&self, port: &str) -> DeviceResult<ChipIdentity> {
        let mut args = vec!["--port".to_string(), port.to_string()];
        args.push("read_mac".to_string());
        let out = self
            .command
            .run(&args)
            .await
            .map_err(|e| DeviceError::Communication(format!("cannot run {}: {e}", self.command)))?;
        if !out.success {
            return Err(DeviceError::Communication(out.failure("read_mac")));
        }
        let identity = parse_identity(&out.stdout)?;
        debug!(
            port,
            chip = %identity.chip_name,
            revision = identity.revision,
            mac = %identity.mac_string(),
            "identified device"
        );
        Ok(identity)
    }
}

#[async_trait]
impl Flasher for Esptool {
    async fn flash(&self, port: &str, map: &FlashMap) -> DeviceResult<()> {
        if map.is_empty() {
            return Err(DeviceError::Flash("flash map is empty".to_string()));
        }
        let mut args = self.port_args(port);
        args.push("write_flash".to_string());
        args.extend(map.to_args());

        info!(port, images = map.len(), baud = self.baud, "flashing");
        let out = self
            .command
            .run(&args)
            .await
            .map_err(|e| DeviceError::Flash(format!("cannot run {}: {e}", self.command)))?;
        if !out.success {
            return Err(DeviceError::Flash(out.failure("write_flash")));
        }
        Ok(())
    }
}
