//! Hotplug-driven batch provisioning.
//!
//! This crate ties the parameter, license and device crates together:
//! - [`ProvisionConfig`] and [`CliArgs`] describe a run
//! - [`LogContext`] is the process log sink (console plus a lazily created
//!   log file)
//! - [`Provisioner::run_session`] drives one device through the
//!   provisioning state machine
//! - [`HotplugMonitor`] provisions every port that appears while it runs
//! - [`DeviceCommand`] sends one-off requests to devices on the network

mod config;
mod error;
mod logging;
mod monitor;
mod remote;
mod session;

pub use config::{
    CliArgs, ConfigError, ConfigResult, ProvisionConfig, ToolsConfig, CONFIG_FILE_NAME,
};
pub use error::{ErrorKind, SessionError, SessionResult};
pub use logging::{
    timestamped_log_path, LogContext, LogWriter, DEFAULT_LOG_DIR, DEFAULT_LOG_PREFIX,
};
pub use monitor::{HotplugMonitor, MonitorSettings};
pub use remote::{DeviceCommand, OTA_STEP_PAUSE};
pub use session::{
    DeviceTools, Provisioner, SessionReport, SessionState, SESSION_BINARY_FILE,
    SESSION_PARAMS_FILE, SESSION_REPORT_FILE,
};
