//! One-off requests to devices that are already running on the network.

use bridgeprov_device::{DeviceApi, DeviceError, DeviceResult, StaticIp, UdpClient};
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Pause between the web interface and the firmware upload of an OTA
/// update, giving the device time to finish writing the first image.
pub const OTA_STEP_PAUSE: Duration = Duration::from_secs(2);

/// Device API commands. Without one the station runs.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Add a UDP target the device forwards its traffic to
    AddUdp {
        /// Device address, e.g. http://192.168.10.66/
        device: String,
        /// Target IP
        #[arg(long)]
        ip: String,
        /// Target port
        #[arg(long)]
        port: u16,
        /// Forget the target on the next reboot
        #[arg(long)]
        no_save: bool,
    },

    /// Set a static station IP (Wi-Fi client mode, applied after reboot)
    StaticIp {
        device: String,
        #[arg(long)]
        ip: String,
        #[arg(long, default_value = "255.255.255.0")]
        netmask: String,
        #[arg(long)]
        gateway: String,
    },

    /// Turn the static station IP off
    ResetStaticIp { device: String },

    /// Update the web interface and/or firmware over the air
    Ota {
        device: String,
        /// Web interface image (www.bin), uploaded first
        #[arg(long)]
        www: Option<PathBuf>,
        /// Application image (db_esp32.bin); the device reboots afterwards
        #[arg(long)]
        app: Option<PathBuf>,
    },
}

impl DeviceCommand {
    /// Address of the device the command targets.
    #[must_use]
    pub fn device(&self) -> &str {
        match self {
            Self::AddUdp { device, .. }
            | Self::StaticIp { device, .. }
            | Self::ResetStaticIp { device }
            | Self::Ota { device, .. } => device,
        }
    }

    /// Sends the command through `api`. `pause` separates the two uploads
    /// of an OTA update.
    ///
    /// # Errors
    ///
    /// Returns the first failed request; later steps are not attempted.
    pub async fn execute(&self, api: &DeviceApi, pause: Duration) -> DeviceResult<()> {
        match self {
            Self::AddUdp {
                ip, port, no_save, ..
            } => {
                let target = UdpClient {
                    ip: ip.clone(),
                    port: *port,
                    persist: !no_save,
                };
                api.add_udp_client(&target).await?;
            }
            Self::StaticIp {
                ip,
                netmask,
                gateway,
                ..
            } => {
                api.set_static_ip(&StaticIp::new(ip, netmask, gateway))
                    .await?;
            }
            Self::ResetStaticIp { .. } => {
                api.reset_static_ip().await?;
            }
            Self::Ota { www, app, .. } => {
                if www.is_none() && app.is_none() {
                    return Err(DeviceError::InvalidArgument(
                        "OTA update needs --www and/or --app".to_string(),
                    ));
                }
                if let Some(www) = www {
                    api.update_www(www).await?;
                    if app.is_some() && !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
                if let Some(app) = app {
                    api.update_firmware(app).await?;
                    info!(device = %api.base_url(), "device is rebooting into the new firmware");
                }
            }
        }
        Ok(())
    }
}
