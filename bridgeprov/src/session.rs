//! Per-device provisioning state machine.
//!
//! A session walks one device through
//! `Detected → Identified → KeyDerived → LicenseAcquired → ConfigMerged →
//! LicenseEmbedded → BinaryRendered → Flashed → Done`. Each entry action
//! runs exactly once; the first failure moves the session to `Aborted`
//! with the failing state and reason recorded. Nothing is retried and
//! nothing written on the host is rolled back.
//!
//! The device is only written in the `Flashed` step, which is reached only
//! after a verified license has been secured in the cache.

use crate::error::{ErrorKind, SessionError, SessionResult};
use bridgeprov_device::{
    BinaryRenderer, ChipIdentity, Flasher, IdentityProbe, Release, SupportedChip,
    CONFIG_PARTITION_SIZE,
};
use bridgeprov_license::{
    AcquiredLicense, ActivationKey, LicenseAcquirer, LicenseSource, PartitionReader,
    PartitionRecovery,
};
use bridgeprov_params::{
    assign_index, embed_license, IndexOverrides, IndexReport, ParamStore, KEY_STATION_IP,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument, Span};

/// Indexed, license-embedded configuration written for each session.
pub const SESSION_PARAMS_FILE: &str = "params.csv";
/// Rendered configuration partition.
pub const SESSION_BINARY_FILE: &str = "settings.bin";
/// Session summary.
pub const SESSION_REPORT_FILE: &str = "session.json";

/// Provisioning states in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionState {
    Detected,
    Identified,
    KeyDerived,
    LicenseAcquired,
    ConfigMerged,
    LicenseEmbedded,
    BinaryRendered,
    Flashed,
    Done,
    Aborted,
}

impl SessionState {
    /// The state that follows on success; None for terminal states.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Detected => Some(Self::Identified),
            Self::Identified => Some(Self::KeyDerived),
            Self::KeyDerived => Some(Self::LicenseAcquired),
            Self::LicenseAcquired => Some(Self::ConfigMerged),
            Self::ConfigMerged => Some(Self::LicenseEmbedded),
            Self::LicenseEmbedded => Some(Self::BinaryRendered),
            Self::BinaryRendered => Some(Self::Flashed),
            Self::Flashed => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one session, also written as `session.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub port: String,
    pub device_index: u32,
    /// Final state, `Done` or `Aborted`.
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_source: Option<LicenseSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_ip: Option<String>,
    /// Which per-device fields the index pass changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<IndexReport>,
    /// State whose entry action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Directory holding this session's host-side artifacts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,
}

impl SessionReport {
    fn new(port: &str, device_index: u32) -> Self {
        Self {
            port: port.to_string(),
            device_index,
            state: SessionState::Detected,
            chip: None,
            activation_key: None,
            license_source: None,
            assigned_ip: None,
            updated: None,
            failed_in: None,
            kind: None,
            reason: None,
            artifacts: None,
        }
    }

    /// True if the device reached `Done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }
}

/// External tool collaborators.
#[derive(Clone)]
pub struct DeviceTools {
    pub probe: Arc<dyn IdentityProbe>,
    pub reader: Arc<dyn PartitionReader>,
    pub renderer: Arc<dyn BinaryRenderer>,
    pub flasher: Arc<dyn Flasher>,
}

/// Everything a session needs; cheap to clone into a task.
#[derive(Clone)]
pub struct Provisioner {
    tools: DeviceTools,
    acquirer: Arc<LicenseAcquirer>,
    release: Arc<Release>,
    merged: Arc<ParamStore>,
    overrides: IndexOverrides,
    work_dir: PathBuf,
}

impl Provisioner {
    /// `merged` is the release template with the user parameters merged in;
    /// every session starts from a copy of it.
    pub fn new(
        tools: DeviceTools,
        acquirer: Arc<LicenseAcquirer>,
        release: Release,
        merged: ParamStore,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tools,
            acquirer,
            release: Arc::new(release),
            merged: Arc::new(merged),
            overrides: IndexOverrides::default(),
            work_dir: work_dir.into(),
        }
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: IndexOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Provisions the device on `port` as device number `index`.
    ///
    /// Never fails: the outcome, including any abort reason, is in the
    /// returned report.
    pub async fn run_session(&self, port: &str, index: u32) -> SessionReport {
        let span = info_span!(
            "session",
            port = %port,
            activation_key = tracing::field::Empty
        );
        let mut session = Session {
            provisioner: self,
            port,
            dir: self.work_dir.join(format!("port_{}", sanitize_port(port))),
            report: SessionReport::new(port, index),
        };
        async {
            info!(index, "device detected");
            let result = session.drive().await;
            session.finish(result).await;
        }
        .instrument(span)
        .await;
        session.report
    }
}

/// Turns a port name into something usable as a directory name.
fn sanitize_port(port: &str) -> String {
    let name = port.rsplit(['/', '\\']).next().unwrap_or(port);
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

struct Session<'a> {
    provisioner: &'a Provisioner,
    port: &'a str,
    dir: PathBuf,
    report: SessionReport,
}

impl Session<'_> {
    fn enter(&mut self, state: SessionState) {
        self.report.state = state;
        info!(state = %state, "transition");
    }

    async fn drive(&mut self) -> SessionResult<()> {
        let p = self.provisioner;

        let (mut identity, chip) = self.identify().await?;
        self.enter(SessionState::Identified);

        let key = ActivationKey::derive(&mut identity)
            .await
            .map_err(|e| SessionError::from_license(SessionState::KeyDerived, e))?;
        Span::current().record("activation_key", key.as_str());
        self.report.activation_key = Some(key.as_str().to_string());
        self.dir = p.work_dir.join(key.file_stem());
        self.enter(SessionState::KeyDerived);

        let license = self.acquire(&key).await?;
        self.report.license_source = Some(license.source);
        self.enter(SessionState::LicenseAcquired);

        let mut config = (*p.merged).clone();
        let updated = assign_index(&mut config, self.report.device_index, &p.overrides)
            .map_err(|e| SessionError::from_params(SessionState::ConfigMerged, e))?;
        if !updated.ip_updated {
            warn!(index = self.report.device_index, "station IP was not updated");
        }
        if !updated.hostname_updated {
            warn!(index = self.report.device_index, "hostname was not updated");
        }
        self.report.updated = Some(updated);
        self.report.assigned_ip = config
            .value(KEY_STATION_IP)
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string);
        self.enter(SessionState::ConfigMerged);

        let params_path = self.dir.join(SESSION_PARAMS_FILE);
        embed_license(&mut config, &license.bytes);
        config
            .save(&params_path)
            .map_err(|e| SessionError::from_params(SessionState::LicenseEmbedded, e))?;
        self.enter(SessionState::LicenseEmbedded);

        let binary_path = self.dir.join(SESSION_BINARY_FILE);
        p.tools
            .renderer
            .render(&params_path, &binary_path, CONFIG_PARTITION_SIZE)
            .await
            .map_err(|e| SessionError::from_device(SessionState::BinaryRendered, e))?;
        self.enter(SessionState::BinaryRendered);

        let map = p
            .release
            .address_map(chip, &binary_path)
            .map_err(|e| SessionError::from_device(SessionState::Flashed, e))?;
        p.tools
            .flasher
            .flash(self.port, &map)
            .await
            .map_err(|e| SessionError::from_device(SessionState::Flashed, e))?;
        self.enter(SessionState::Flashed);

        self.enter(SessionState::Done);
        Ok(())
    }

    async fn identify(&mut self) -> SessionResult<(ChipIdentity, SupportedChip)> {
        let identity = self
            .provisioner
            .tools
            .probe
            .identify(self.port)
            .await
            .map_err(|e| SessionError::from_device(SessionState::Identified, e))?;
        self.report.chip = Some(identity.chip_name.clone());
        let chip = identity
            .supported_chip()
            .map_err(|e| SessionError::from_device(SessionState::Identified, e))?;
        info!(
            chip = %chip,
            revision = identity.revision,
            mac = %identity.mac_string(),
            "identified device"
        );
        Ok((identity, chip))
    }

    async fn acquire(&self, key: &ActivationKey) -> SessionResult<AcquiredLicense> {
        let p = self.provisioner;
        let recovery = PartitionRecovery::new(p.tools.reader.as_ref(), self.port, &self.dir);
        let license = p
            .acquirer
            .acquire(key, &recovery)
            .await
            .map_err(|e| SessionError::from_license(SessionState::LicenseAcquired, e))?;
        info!(
            source = %license.source,
            license_type = ?license.info.license_type,
            valid_until = license.info.valid_until,
            path = %license.path.display(),
            "license secured"
        );
        Ok(license)
    }

    async fn finish(&mut self, result: SessionResult<()>) {
        match result {
            Ok(()) => match &self.report.assigned_ip {
                Some(ip) => info!(index = self.report.device_index, ip = %ip, "device provisioned"),
                None => info!(index = self.report.device_index, "device provisioned"),
            },
            Err(err) => {
                error!(
                    state = %err.state,
                    kind = %err.kind,
                    reason = %err.message,
                    "session aborted"
                );
                self.report.state = SessionState::Aborted;
                self.report.failed_in = Some(err.state);
                self.report.kind = Some(err.kind);
                self.report.reason = Some(err.message);
            }
        }
        self.report.artifacts = Some(self.dir.clone());
        if let Err(e) = self.write_report().await {
            warn!(error = %e, "cannot write session summary");
        }
    }

    async fn write_report(&self) -> SessionResult<()> {
        let state = self.report.state;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SessionError::storage(state, e))?;
        let json = serde_json::to_vec_pretty(&self.report)
            .map_err(|e| SessionError::storage(state, e))?;
        tokio::fs::write(self.dir.join(SESSION_REPORT_FILE), json)
            .await
            .map_err(|e| SessionError::storage(state, e))
    }
}
