//! Hotplug monitor.
//!
//! Polls the serial port list and provisions every port that appears.
//! Ports attached when the monitor starts are treated as already handled.
//! Each new port gets its own task holding the port claim; the monitor
//! waits for that task's report before acting on the next port and owns
//! the device index, which only advances when a session reaches `Done`.
//! A shutdown request aborts the session in flight, which kills any tool
//! process it was waiting on.

use crate::config::ProvisionConfig;
use crate::session::{Provisioner, SessionReport};
use bridgeprov_device::{diff_ports, DeviceResult, PortClaims, PortScanner};
use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Timing and counter settings for the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// Delay between seeing a port and starting its session.
    pub settle_delay: Duration,
    pub start_index: u32,
    /// Ring the terminal bell after every session.
    pub bell: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            start_index: 18,
            bell: false,
        }
    }
}

impl From<&ProvisionConfig> for MonitorSettings {
    fn from(config: &ProvisionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            settle_delay: config.settle_delay(),
            start_index: config.start_index,
            bell: config.bell,
        }
    }
}

/// How a single port's provisioning attempt ended.
enum Provisioned {
    Report(SessionReport),
    Skipped,
    Interrupted,
}

/// The polling loop.
pub struct HotplugMonitor {
    scanner: Arc<dyn PortScanner>,
    provisioner: Provisioner,
    claims: PortClaims,
    settings: MonitorSettings,
    known: BTreeSet<String>,
    next_index: u32,
}

impl HotplugMonitor {
    pub fn new(
        scanner: Arc<dyn PortScanner>,
        provisioner: Provisioner,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            scanner,
            provisioner,
            claims: PortClaims::new(),
            next_index: settings.start_index,
            settings,
            known: BTreeSet::new(),
        }
    }

    /// Index the next successful device will get.
    #[must_use]
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    #[must_use]
    pub fn known_ports(&self) -> &BTreeSet<String> {
        &self.known
    }

    /// Records the ports attached right now so they are not provisioned.
    ///
    /// # Errors
    ///
    /// Fails if the port list cannot be read.
    pub fn prime(&mut self) -> DeviceResult<()> {
        self.known = self.scanner.scan()?;
        if self.known.is_empty() {
            info!("no serial ports attached");
        } else {
            info!(ports = ?self.known, "ignoring ports attached before start");
        }
        Ok(())
    }

    /// Runs one poll tick and provisions every newly appeared port.
    ///
    /// A failed scan is logged and treated as "no change".
    pub async fn poll_once(&mut self) -> Vec<SessionReport> {
        let never = std::future::pending::<()>();
        tokio::pin!(never);
        self.poll_until(never).await.0
    }

    /// Like [`poll_once`](Self::poll_once), but gives up as soon as
    /// `shutdown` resolves. The flag is true when it was interrupted.
    async fn poll_until<F>(&mut self, mut shutdown: Pin<&mut F>) -> (Vec<SessionReport>, bool)
    where
        F: Future<Output = ()>,
    {
        let current = match self.scanner.scan() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(error = %e, "port scan failed");
                return (Vec::new(), false);
            }
        };
        let changes = diff_ports(&self.known, &current);
        for port in &changes.removed {
            info!(port = %port, "port removed");
        }
        self.known = current;

        let mut reports = Vec::with_capacity(changes.added.len());
        for port in changes.added {
            info!(port = %port, "port appeared");
            if !self.settings.settle_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.settle_delay) => {}
                    () = shutdown.as_mut() => return (reports, true),
                }
            }
            match self.provision(port, shutdown.as_mut()).await {
                Provisioned::Report(report) => reports.push(report),
                Provisioned::Skipped => {}
                Provisioned::Interrupted => return (reports, true),
            }
        }
        (reports, false)
    }

    async fn provision<F>(&mut self, port: String, shutdown: Pin<&mut F>) -> Provisioned
    where
        F: Future<Output = ()>,
    {
        let Some(claim) = self.claims.claim(&port) else {
            warn!(port = %port, "port already has a session, skipping");
            return Provisioned::Skipped;
        };

        let (tx, mut rx) = mpsc::channel(1);
        let provisioner = self.provisioner.clone();
        let index = self.next_index;
        let task = tokio::spawn(async move {
            let report = provisioner.run_session(claim.port(), index).await;
            drop(claim);
            let _ = tx.send(report).await;
        });

        let report = tokio::select! {
            report = rx.recv() => report,
            () = shutdown => {
                task.abort();
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        error!(port = %port, error = %e, "session task failed");
                    }
                }
                warn!(port = %port, index, "shutdown during session, device left unfinished");
                return Provisioned::Interrupted;
            }
        };
        if let Err(e) = task.await {
            error!(port = %port, error = %e, "session task failed");
        }
        let Some(report) = report else {
            error!(port = %port, "session ended without a report");
            return Provisioned::Skipped;
        };

        if report.is_done() {
            self.next_index += 1;
            debug!(next_index = self.next_index, "advanced device index");
        }
        if self.settings.bell {
            ring_bell();
        }
        Provisioned::Report(report)
    }

    /// Polls until `shutdown` resolves. A session in progress when the
    /// shutdown arrives is aborted and its device is left unfinished.
    ///
    /// # Errors
    ///
    /// Fails only if the initial port scan fails.
    pub async fn run<F>(&mut self, shutdown: F) -> DeviceResult<()>
    where
        F: Future<Output = ()>,
    {
        self.prime()?;
        info!(
            next_index = self.next_index,
            poll_ms = self.settings.poll_interval.as_millis(),
            "waiting for devices"
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let (reports, interrupted) = self.poll_until(shutdown.as_mut()).await;
                    for report in reports {
                        debug!(port = %report.port, state = %report.state, "session finished");
                    }
                    if interrupted {
                        break;
                    }
                }
            }
        }
        info!(next_index = self.next_index, "shutting down");
        Ok(())
    }
}

fn ring_bell() {
    let mut out = std::io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}
