//! Serial port discovery and exclusive port ownership.

use crate::error::{DeviceError, DeviceResult};
use serialport::SerialPortType;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Lists the serial ports currently attached to the host.
pub trait PortScanner: Send + Sync {
    /// Returns the names of all attached ports.
    fn scan(&self) -> DeviceResult<BTreeSet<String>>;
}

/// [`PortScanner`] backed by the operating system's port list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts {
    /// Only report USB serial adapters.
    pub usb_only: bool,
}

impl PortScanner for SystemPorts {
    fn scan(&self) -> DeviceResult<BTreeSet<String>> {
        let ports = serialport::available_ports()
            .map_err(|e| DeviceError::Communication(format!("cannot enumerate serial ports: {e}")))?;
        Ok(ports
            .into_iter()
            .filter(|p| !self.usb_only || matches!(p.port_type, SerialPortType::UsbPort(_)))
            .map(|p| p.port_name)
            .collect())
    }
}

/// Difference between two port scans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Compares a fresh scan against the previously known ports.
#[must_use]
pub fn diff_ports(known: &BTreeSet<String>, current: &BTreeSet<String>) -> PortChanges {
    PortChanges {
        added: current.difference(known).cloned().collect(),
        removed: known.difference(current).cloned().collect(),
    }
}

/// Registry guaranteeing at most one session per port.
#[derive(Debug, Clone, Default)]
pub struct PortClaims {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl PortClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `port`, or returns None if it is already in use.
    #[must_use]
    pub fn claim(&self, port: &str) -> Option<PortClaim> {
        let mut claimed = self.claimed.lock().ok()?;
        if !claimed.insert(port.to_string()) {
            return None;
        }
        debug!(port, "claimed port");
        Some(PortClaim {
            port: port.to_string(),
            claims: Arc::clone(&self.claimed),
        })
    }

    /// Returns true if `port` is currently claimed.
    #[must_use]
    pub fn is_claimed(&self, port: &str) -> bool {
        self.claimed
            .lock()
            .map(|claimed| claimed.contains(port))
            .unwrap_or(false)
    }
}

/// Exclusive ownership of a port; released when dropped.
#[derive(Debug)]
pub struct PortClaim {
    port: String,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl PortClaim {
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        if let Ok(mut claimed) = self.claims.lock() {
            claimed.remove(&self.port);
        }
        debug!(port = %self.port, "released port");
    }
}
