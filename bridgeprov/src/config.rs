//! Run configuration.
//!
//! Settings come from an optional TOML file and are then overlaid by
//! command line flags. Every field has a default so an empty file (or no
//! file) is a valid configuration.

use crate::logging::{DEFAULT_LOG_DIR, DEFAULT_LOG_PREFIX};
use crate::remote::DeviceCommand;
use bridgeprov_device::{ToolCommand, DEFAULT_BAUD, DEFAULT_TOOL_TIMEOUT};
use bridgeprov_license::{mask_token, IssuanceRequest, IssuerConfig, LicenseType};
use bridgeprov_params::IndexOverrides;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the configuration file looked up when none is given.
pub const CONFIG_FILE_NAME: &str = "provision.toml";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// External tool command lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Flashing tool.
    pub esptool: ToolCommand,
    /// Parameter file → partition binary generator.
    pub nvs_partition_gen: ToolCommand,
    /// Partition binary → JSON decoder.
    pub nvs_tool: ToolCommand,
    /// A tool run still going after this many seconds is killed.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            esptool: ToolCommand::new("esptool.py"),
            nvs_partition_gen: ToolCommand::new("nvs_partition_gen.py"),
            nvs_tool: ToolCommand::new("nvs_tool.py"),
            timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
        }
    }
}

impl ToolsConfig {
    /// Applies the configured time limit to `command`.
    #[must_use]
    pub fn limited(&self, command: &ToolCommand) -> ToolCommand {
        command
            .clone()
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Complete provisioning run configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Firmware release directory.
    pub release_dir: PathBuf,
    /// User parameter file merged into the release template.
    pub user_params: PathBuf,
    /// Trusted license public key (PEM).
    pub public_key: PathBuf,
    /// License issuance endpoint; unset runs offline.
    pub issue_url: Option<String>,
    /// Bearer token for the issuance endpoint.
    pub token: Option<String>,
    /// Requested license type.
    pub license_type: LicenseType,
    /// Requested validity in days; 0 never expires.
    pub validity_days: u32,
    /// First device index.
    pub start_index: u32,
    /// Flashing baud rate.
    pub baud: u32,
    /// Per-session artifact directory.
    pub work_dir: PathBuf,
    /// License cache directory.
    pub cache_dir: PathBuf,
    /// Log file directory.
    pub log_dir: PathBuf,
    /// Log file name prefix.
    pub log_prefix: String,
    pub probe_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    /// Explicit station IP (applied to every device).
    pub ip: Option<String>,
    /// Explicit hostname (applied to every device).
    pub hostname: Option<String>,
    /// Explicit access point SSID (applied to every device).
    pub ssid: Option<String>,
    /// Ignore serial ports that are not USB adapters.
    pub usb_only: bool,
    /// Ring the terminal bell after every device.
    pub bell: bool,
    pub tools: ToolsConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            release_dir: PathBuf::from("release"),
            user_params: PathBuf::from("my_params.csv"),
            public_key: PathBuf::from("license_public_key.pem"),
            issue_url: None,
            token: None,
            license_type: LicenseType::Activated,
            validity_days: 0,
            start_index: 18,
            baud: DEFAULT_BAUD,
            work_dir: PathBuf::from("provisioning"),
            cache_dir: PathBuf::from("dlse_licenses"),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_prefix: DEFAULT_LOG_PREFIX.to_string(),
            probe_timeout_ms: 3_000,
            poll_interval_ms: 1_000,
            settle_delay_ms: 2_000,
            ip: None,
            hostname: None,
            ssid: None,
            usb_only: false,
            bell: true,
            tools: ToolsConfig::default(),
        }
    }
}

impl std::fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("release_dir", &self.release_dir)
            .field("user_params", &self.user_params)
            .field("public_key", &self.public_key)
            .field("issue_url", &self.issue_url)
            .field("token", &self.token.as_deref().map(mask_token))
            .field("license_type", &self.license_type)
            .field("validity_days", &self.validity_days)
            .field("start_index", &self.start_index)
            .field("baud", &self.baud)
            .field("work_dir", &self.work_dir)
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl ProvisionConfig {
    /// Parses a TOML document.
    pub fn from_toml(text: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Loads `path`.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// The file [`load`](Self::load) reads: the explicit one if given,
    /// otherwise the first of `./provision.toml` and
    /// `<config dir>/bridgeprov/provision.toml` that exists.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        std::iter::once(PathBuf::from(CONFIG_FILE_NAME))
            .chain(dirs::config_dir().map(|dir| dir.join("bridgeprov").join(CONFIG_FILE_NAME)))
            .find(|candidate| candidate.is_file())
    }

    /// Loads the file found by [`locate`](Self::locate), or the defaults
    /// if there is none. Also returns the file that was read.
    ///
    /// Nothing is logged here since this runs before logging is set up.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<(Self, Option<PathBuf>)> {
        match Self::locate(explicit) {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.issue_url.is_some() && self.token.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Invalid(
                "a license server URL requires a token".to_string(),
            ));
        }
        if self.baud == 0 {
            return Err(ConfigError::Invalid("baud rate must be positive".to_string()));
        }
        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::Invalid("tool timeout must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-device field overrides.
    #[must_use]
    pub fn overrides(&self) -> IndexOverrides {
        IndexOverrides {
            ip: self.ip.clone(),
            hostname: self.hostname.clone(),
            ssid: self.ssid.clone(),
        }
    }

    /// Issuance client settings, or None when running offline.
    #[must_use]
    pub fn issuer(&self) -> Option<IssuerConfig> {
        let url = self.issue_url.as_deref()?;
        let token = self.token.as_deref()?;
        let mut config = IssuerConfig::new(url, token);
        config.probe_timeout = self.probe_timeout();
        Some(config)
    }

    #[must_use]
    pub fn issuance_request(&self) -> IssuanceRequest {
        IssuanceRequest {
            license_type: self.license_type,
            validity_days: self.validity_days,
        }
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Command line flags. Every flag overrides the matching file setting.
#[derive(Parser, Debug, Default)]
#[command(name = "bridgeprov")]
#[command(about = "Provision, license and flash every device plugged into this host")]
pub struct CliArgs {
    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Firmware release directory
    #[arg(short, long)]
    pub release: Option<PathBuf>,

    /// User parameter file (.csv)
    #[arg(short, long)]
    pub params: Option<PathBuf>,

    /// License server token
    #[arg(short, long, env = "BRIDGEPROV_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// License server URL (omit to run offline)
    #[arg(long)]
    pub issue_url: Option<String>,

    /// Trusted license public key (PEM)
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// Index of the first device
    #[arg(short = 'i', long)]
    pub start_index: Option<u32>,

    /// Flashing baud rate. Lower to 115200 if flashing fails
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Static station IP for every device
    #[arg(long)]
    pub ip: Option<String>,

    /// Hostname for every device
    #[arg(long)]
    pub hostname: Option<String>,

    /// Access point SSID for every device
    #[arg(long)]
    pub ssid: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<DeviceCommand>,
}

impl CliArgs {
    /// Overlays the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ProvisionConfig) {
        if let Some(release) = &self.release {
            config.release_dir.clone_from(release);
        }
        if let Some(params) = &self.params {
            config.user_params.clone_from(params);
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(url) = &self.issue_url {
            config.issue_url = Some(url.clone());
        }
        if let Some(key) = &self.public_key {
            config.public_key.clone_from(key);
        }
        if let Some(index) = self.start_index {
            config.start_index = index;
        }
        if let Some(baud) = self.baud {
            config.baud = baud;
        }
        if self.ip.is_some() {
            config.ip.clone_from(&self.ip);
        }
        if self.hostname.is_some() {
            config.hostname.clone_from(&self.hostname);
        }
        if self.ssid.is_some() {
            config.ssid.clone_from(&self.ssid);
        }
    }
}
