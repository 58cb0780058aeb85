//! Client for the HTTP API of devices running the firmware.
//!
//! Provisioned units serve a small settings API and two OTA upload
//! endpoints on their station address. Unlike everything else in this
//! crate these calls reach the device over the network, not over a serial
//! port, so the device must be booted and joined to the network.

use crate::error::{DeviceError, DeviceResult};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Timeout of settings requests.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Image uploads get at least this long; the device writes flash while
/// receiving.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

const MAX_ERROR_BODY: usize = 256;

const UDP_CLIENTS_PATH: &str = "api/settings/clients/udp";
const STATIC_IP_PATH: &str = "api/settings/static-ip";
const WWW_UPDATE_PATH: &str = "update/www";
const FIRMWARE_UPDATE_PATH: &str = "update/firmware";

/// A UDP target the device forwards its traffic to, in addition to the
/// ones it already knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdpClient {
    pub ip: String,
    pub port: u16,
    /// Keep the target across reboots.
    #[serde(rename = "save")]
    pub persist: bool,
}

/// Static station address. All fields empty turns the static address off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaticIp {
    #[serde(rename = "ip_sta")]
    pub ip: String,
    #[serde(rename = "ip_sta_netmsk")]
    pub netmask: String,
    #[serde(rename = "ip_sta_gw")]
    pub gateway: String,
}

impl StaticIp {
    pub fn new(
        ip: impl Into<String>,
        netmask: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            netmask: netmask.into(),
            gateway: gateway.into(),
        }
    }

    fn validate(&self) -> DeviceResult<()> {
        for (name, value) in [
            ("IP", &self.ip),
            ("netmask", &self.netmask),
            ("gateway", &self.gateway),
        ] {
            if value.parse::<Ipv4Addr>().is_err() {
                return Err(DeviceError::InvalidArgument(format!(
                    "invalid static {name} '{value}'"
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client bound to one device.
#[derive(Debug, Clone)]
pub struct DeviceApi {
    base: Url,
    client: Client,
    upload_client: Client,
}

impl DeviceApi {
    /// `address` is a URL such as `http://192.168.10.4/` or a bare host,
    /// which is reached over plain HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidArgument`] for an unusable address and
    /// [`DeviceError::Communication`] if the HTTP client cannot be built.
    pub fn new(address: &str) -> DeviceResult<Self> {
        Self::with_timeout(address, DEFAULT_API_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a custom settings request timeout.
    pub fn with_timeout(address: &str, timeout: Duration) -> DeviceResult<Self> {
        let base = base_url(address)?;
        let build = |timeout: Duration| {
            Client::builder().timeout(timeout).build().map_err(|e| {
                DeviceError::Communication(format!("failed to create HTTP client: {e}"))
            })
        };
        Ok(Self {
            base,
            client: build(timeout)?,
            upload_client: build(timeout.max(UPLOAD_TIMEOUT))?,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Adds a UDP target, like the "+" button of the web interface.
    pub async fn add_udp_client(&self, target: &UdpClient) -> DeviceResult<String> {
        if target.ip.parse::<std::net::IpAddr>().is_err() {
            return Err(DeviceError::InvalidArgument(format!(
                "invalid UDP target IP '{}'",
                target.ip
            )));
        }
        info!(
            device = %self.base,
            ip = %target.ip,
            port = target.port,
            persist = target.persist,
            "adding UDP client"
        );
        let response = self
            .client
            .post(self.endpoint(UDP_CLIENTS_PATH)?)
            .json(target)
            .send()
            .await
            .map_err(|e| DeviceError::Communication(format!("UDP client request failed: {e}")))?;
        accepted(response, "add UDP client").await
    }

    /// Sets a static station address. Only used in Wi-Fi client mode and
    /// applied by the device after its next reboot.
    pub async fn set_static_ip(&self, settings: &StaticIp) -> DeviceResult<String> {
        settings.validate()?;
        info!(device = %self.base, ip = %settings.ip, "setting static IP");
        self.post_static_ip(settings).await
    }

    /// Turns the static station address off.
    pub async fn reset_static_ip(&self) -> DeviceResult<String> {
        info!(device = %self.base, "resetting static IP");
        self.post_static_ip(&StaticIp::default()).await
    }

    async fn post_static_ip(&self, settings: &StaticIp) -> DeviceResult<String> {
        let response = self
            .client
            .post(self.endpoint(STATIC_IP_PATH)?)
            .json(settings)
            .send()
            .await
            .map_err(|e| DeviceError::Communication(format!("static IP request failed: {e}")))?;
        accepted(response, "static IP").await
    }

    /// Uploads a web interface image. The device keeps running.
    pub async fn update_www(&self, image: &Path) -> DeviceResult<String> {
        self.upload(WWW_UPDATE_PATH, image, "web interface update").await
    }

    /// Uploads an application image. The device reboots into it once the
    /// upload is accepted.
    pub async fn update_firmware(&self, image: &Path) -> DeviceResult<String> {
        self.upload(FIRMWARE_UPDATE_PATH, image, "firmware update").await
    }

    async fn upload(&self, path: &str, image: &Path, what: &str) -> DeviceResult<String> {
        let url = self.endpoint(path)?;
        let bytes = tokio::fs::read(image).await.map_err(|e| {
            DeviceError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read {}: {e}", image.display()),
            ))
        })?;
        let size = bytes.len();
        info!(url = %url, image = %image.display(), size, "uploading {what}");

        let started = Instant::now();
        let response = self
            .upload_client
            .post(url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| DeviceError::Communication(format!("{what} failed: {e}")))?;
        let elapsed = started.elapsed();
        debug!(
            size,
            elapsed_ms = elapsed.as_millis(),
            kib_per_s = size as f64 / 1024.0 / elapsed.as_secs_f64().max(0.001),
            "upload finished"
        );
        accepted(response, what).await
    }

    fn endpoint(&self, path: &str) -> DeviceResult<Url> {
        self.base
            .join(path)
            .map_err(|e| DeviceError::InvalidArgument(format!("invalid endpoint '{path}': {e}")))
    }
}

fn base_url(address: &str) -> DeviceResult<Url> {
    let address = address.trim();
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| {
        DeviceError::InvalidArgument(format!("invalid device address '{address}': {e}"))
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn accepted(response: reqwest::Response, what: &str) -> DeviceResult<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status != StatusCode::OK {
        warn!(status = %status, "{what} rejected");
        return Err(DeviceError::ApiRejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }
    info!("{what} accepted");
    debug!(body = %body, "device response");
    Ok(body)
}
