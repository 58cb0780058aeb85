//! Local license cache.
//!
//! A directory of license files named after the activation key they were
//! issued to. Entries are only ever added, or replaced by a record that
//! stays valid strictly longer; the cache never deletes anything.
//! A correctly signed record keeps being served after it expires.

use crate::activation::ActivationKey;
use crate::error::{LicenseError, LicenseResult};
use crate::record::{LicenseInfo, LicenseVerifier};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, info, warn};

/// File extension of cached license records.
pub const LICENSE_EXTENSION: &str = "dlselic";

/// A verified license held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLicense {
    /// Location of the record file.
    pub path: PathBuf,
    /// Decoded record fields.
    pub info: LicenseInfo,
    /// Raw record bytes.
    pub bytes: Vec<u8>,
}

/// Directory-backed license cache keyed by activation key.
#[derive(Debug)]
pub struct LicenseCache {
    dir: PathBuf,
    /// Serializes writes for the same activation key.
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LicenseCache {
    /// Creates a cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path used for `key`.
    #[must_use]
    pub fn path_for(&self, key: &ActivationKey) -> PathBuf {
        self.dir
            .join(format!("{}.{LICENSE_EXTENSION}", key.file_stem()))
    }

    /// Returns the cached license for `key` if it exists and verifies.
    ///
    /// Unreadable, malformed or untrusted files are reported and treated as
    /// absent.
    pub async fn lookup(
        &self,
        key: &ActivationKey,
        verifier: &LicenseVerifier,
    ) -> LicenseResult<Option<CachedLicense>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached license");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match verifier
            .decode_and_verify(&bytes, Some(key.as_str()))
            .and_then(|v| v.into_result())
        {
            Ok(info) => Ok(Some(CachedLicense { path, info, bytes })),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring cached license");
                Ok(None)
            }
        }
    }

    /// Verifies `bytes` for `key` and stores them unless the cache already
    /// holds a record that stays valid at least as long.
    ///
    /// Returns the license that is in effect after the call.
    ///
    /// # Errors
    ///
    /// Fails if `bytes` is not a valid record for `key` or the write fails.
    pub async fn store(
        &self,
        key: &ActivationKey,
        bytes: &[u8],
        verifier: &LicenseVerifier,
    ) -> LicenseResult<CachedLicense> {
        let info = verifier
            .decode_and_verify(bytes, Some(key.as_str()))?
            .into_result()?;

        let lock = self.lock_for(key)?;
        let stored = {
            let _guard = lock.lock().await;
            self.replace(key, bytes, info, verifier).await
        };
        self.release_lock(key, &lock);
        stored
    }

    async fn replace(
        &self,
        key: &ActivationKey,
        bytes: &[u8],
        info: LicenseInfo,
        verifier: &LicenseVerifier,
    ) -> LicenseResult<CachedLicense> {
        if let Some(existing) = self.lookup(key, verifier).await? {
            if !info.outlasts(&existing.info) {
                debug!(
                    path = %existing.path.display(),
                    "cached license is at least as recent, keeping it"
                );
                return Ok(existing);
            }
        }

        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{LICENSE_EXTENSION}.tmp"));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        info!(path = %path.display(), activation_key = %key, "stored license in cache");

        Ok(CachedLicense {
            path,
            info,
            bytes: bytes.to_vec(),
        })
    }

    fn lock_for(&self, key: &ActivationKey) -> LicenseResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| LicenseError::Storage("cache lock poisoned".to_string()))?;
        Ok(locks
            .entry(key.as_str().to_string())
            .or_default()
            .clone())
    }

    /// Drops the lock entry for `key` unless another store is waiting on it.
    fn release_lock(&self, key: &ActivationKey, lock: &Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.key_locks.lock() else {
            return;
        };
        let is_current = locks
            .get(key.as_str())
            .is_some_and(|current| Arc::ptr_eq(current, lock));
        // one reference in the map, one held by the caller
        if is_current && Arc::strong_count(lock) <= 2 {
            locks.remove(key.as_str());
        }
    }

    /// Number of activation keys with a store in progress.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.key_locks.lock().map_or(0, |locks| locks.len())
    }
}
