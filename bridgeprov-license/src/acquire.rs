//! Ordered license acquisition.
//!
//! Strategies are tried in a fixed order and the first one that produces a
//! verified record wins:
//!
//! 1. the local [`LicenseCache`],
//! 2. the remote issuing service, if one is configured and the
//!    connectivity probe succeeds,
//! 3. recovery of the license already installed on the device.
//!
//! Any record obtained from the network or the device is verified against
//! the device's activation key and written to the cache before it is
//! returned. If every strategy comes up empty the caller gets
//! [`LicenseError::LicenseUnavailable`] and must not touch the device's
//! configuration partition.

use crate::activation::ActivationKey;
use crate::cache::{CachedLicense, LicenseCache};
use crate::error::{LicenseError, LicenseResult};
use crate::issuer::{IssuanceRequest, RemoteIssuer};
use crate::nvs::{extract_license_blob, PartitionReader};
use crate::record::{LicenseInfo, LicenseVerifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which strategy produced the license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseSource {
    Cache,
    Remote,
    Device,
}

impl fmt::Display for LicenseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Remote => "remote",
            Self::Device => "device",
        })
    }
}

/// A verified license ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredLicense {
    /// Strategy that produced it.
    pub source: LicenseSource,
    /// Location of the cached copy.
    pub path: PathBuf,
    /// Decoded record fields.
    pub info: LicenseInfo,
    /// Raw record bytes.
    pub bytes: Vec<u8>,
}

impl AcquiredLicense {
    fn from_cached(source: LicenseSource, cached: CachedLicense) -> Self {
        Self {
            source,
            path: cached.path,
            info: cached.info,
            bytes: cached.bytes,
        }
    }
}

/// Result of a single strategy.
#[derive(Debug)]
pub enum Attempt {
    Found(AcquiredLicense),
    NotFound(String),
    Failed(LicenseError),
}

/// Reads the license currently installed on a device.
#[async_trait]
pub trait LicenseRecovery: Send + Sync {
    /// Returns the raw record bytes stored on the device.
    async fn recover(&self) -> LicenseResult<Vec<u8>>;
}

/// [`LicenseRecovery`] that decodes the device's key-value partition.
pub struct PartitionRecovery<'a> {
    reader: &'a dyn PartitionReader,
    port: &'a str,
    scratch_dir: &'a Path,
}

impl<'a> PartitionRecovery<'a> {
    /// Recovers from the device on `port`, keeping dumps in `scratch_dir`.
    pub fn new(reader: &'a dyn PartitionReader, port: &'a str, scratch_dir: &'a Path) -> Self {
        Self {
            reader,
            port,
            scratch_dir,
        }
    }
}

#[async_trait]
impl LicenseRecovery for PartitionRecovery<'_> {
    async fn recover(&self) -> LicenseResult<Vec<u8>> {
        let entries = self.reader.read_entries(self.port, self.scratch_dir).await?;
        debug!(port = self.port, entries = entries.len(), "decoded key-value partition");
        extract_license_blob(&entries)
    }
}

/// Runs the acquisition chain for one device at a time.
pub struct LicenseAcquirer {
    verifier: LicenseVerifier,
    cache: Arc<LicenseCache>,
    issuer: Option<Arc<dyn RemoteIssuer>>,
    request: IssuanceRequest,
}

impl LicenseAcquirer {
    /// Creates an offline acquirer (cache and device recovery only).
    pub fn new(verifier: LicenseVerifier, cache: Arc<LicenseCache>) -> Self {
        Self {
            verifier,
            cache,
            issuer: None,
            request: IssuanceRequest::default(),
        }
    }

    /// Enables remote issuance.
    #[must_use]
    pub fn with_issuer(mut self, issuer: Arc<dyn RemoteIssuer>, request: IssuanceRequest) -> Self {
        self.issuer = Some(issuer);
        self.request = request;
        self
    }

    /// Returns the cache used by this acquirer.
    #[must_use]
    pub fn cache(&self) -> &LicenseCache {
        &self.cache
    }

    /// Returns the trusted verifier.
    #[must_use]
    pub fn verifier(&self) -> &LicenseVerifier {
        &self.verifier
    }

    /// Obtains a verified license for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::LicenseUnavailable`] once every strategy has
    /// been exhausted, or a storage error if a recovered record could not be
    /// secured in the cache.
    pub async fn acquire(
        &self,
        key: &ActivationKey,
        recovery: &dyn LicenseRecovery,
    ) -> LicenseResult<AcquiredLicense> {
        let mut reasons = Vec::new();

        for source in [LicenseSource::Cache, LicenseSource::Remote, LicenseSource::Device] {
            let attempt = match source {
                LicenseSource::Cache => self.from_cache(key).await,
                LicenseSource::Remote => self.from_remote(key).await,
                LicenseSource::Device => self.from_device(key, recovery).await,
            };
            match attempt {
                Attempt::Found(license) => {
                    info!(
                        source = %license.source,
                        path = %license.path.display(),
                        license_type = ?license.info.license_type,
                        valid_until = license.info.valid_until,
                        "license acquired"
                    );
                    if license.info.is_expired() {
                        warn!(valid_until = license.info.valid_until, "license has expired");
                    }
                    return Ok(license);
                }
                Attempt::NotFound(reason) => {
                    debug!(%source, %reason, "no license from source");
                    reasons.push(format!("{source}: {reason}"));
                }
                // A recovered record that cannot be cached must not be flashed over.
                Attempt::Failed(e @ (LicenseError::Storage(_) | LicenseError::Io(_)))
                    if source == LicenseSource::Device =>
                {
                    return Err(e);
                }
                Attempt::Failed(e) => {
                    warn!(%source, error = %e, "license source failed");
                    reasons.push(format!("{source}: {e}"));
                }
            }
        }

        Err(LicenseError::LicenseUnavailable(reasons.join("; ")))
    }

    async fn from_cache(&self, key: &ActivationKey) -> Attempt {
        match self.cache.lookup(key, &self.verifier).await {
            Ok(Some(cached)) => Attempt::Found(AcquiredLicense::from_cached(LicenseSource::Cache, cached)),
            Ok(None) => Attempt::NotFound("no valid cached license".to_string()),
            Err(e) => Attempt::Failed(e),
        }
    }

    async fn from_remote(&self, key: &ActivationKey) -> Attempt {
        let Some(issuer) = &self.issuer else {
            return Attempt::NotFound("no license server configured".to_string());
        };
        if !issuer.probe().await {
            return Attempt::NotFound("license server unreachable".to_string());
        }

        let issued = match issuer.request(key, &self.request).await {
            Ok(issued) => issued,
            Err(e) => return Attempt::Failed(e),
        };
        if let Some(name) = &issued.suggested_name {
            debug!(name = %name, "server suggested license file name");
        }
        match self.cache.store(key, &issued.bytes, &self.verifier).await {
            Ok(cached) => Attempt::Found(AcquiredLicense::from_cached(LicenseSource::Remote, cached)),
            Err(e) => Attempt::Failed(e),
        }
    }

    async fn from_device(&self, key: &ActivationKey, recovery: &dyn LicenseRecovery) -> Attempt {
        info!(activation_key = %key, "trying to recover license from device");
        let bytes = match recovery.recover().await {
            Ok(bytes) => bytes,
            Err(LicenseError::LicenseUnavailable(reason)) => return Attempt::NotFound(reason),
            Err(e) => return Attempt::Failed(e),
        };

        if let Err(e) = self
            .verifier
            .decode_and_verify(&bytes, Some(key.as_str()))
            .and_then(|v| v.into_result())
        {
            return Attempt::Failed(e);
        }
        match self.cache.store(key, &bytes, &self.verifier).await {
            Ok(cached) => Attempt::Found(AcquiredLicense::from_cached(LicenseSource::Device, cached)),
            Err(e) => Attempt::Failed(e),
        }
    }
}
