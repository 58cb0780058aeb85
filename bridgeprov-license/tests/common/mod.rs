//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridgeprov_license::{
    ActivationKey, IssuanceRequest, IssuedLicense, LicenseError, LicenseRecovery, LicenseResult,
    LicenseSigner, LicenseType, LicenseVerifier, RemoteIssuer,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The 4096-bit test signing key; parsed once per test binary.
pub fn signer() -> &'static LicenseSigner {
    static SIGNER: OnceLock<LicenseSigner> = OnceLock::new();
    SIGNER.get_or_init(|| {
        let pem = std::fs::read_to_string(fixture("test_signing_key.pem")).unwrap();
        LicenseSigner::from_pem(&pem).unwrap()
    })
}

pub fn verifier() -> LicenseVerifier {
    LicenseVerifier::load(fixture("test_public_key.pem")).unwrap()
}

pub fn untrusted_verifier() -> LicenseVerifier {
    LicenseVerifier::load(fixture("untrusted_public_key.pem")).unwrap()
}

pub fn device_key() -> ActivationKey {
    ActivationKey::from_parts([0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc], 5, 4)
}

pub fn other_device_key() -> ActivationKey {
    ActivationKey::from_parts([0x24, 0x6f, 0x28, 0x11, 0x22, 0x33], 13, 1)
}

/// Signs a record for `key` with the test signer.
pub fn signed_record(key: &ActivationKey, valid_until: i64) -> Vec<u8> {
    signer()
        .encode(key.as_str(), LicenseType::Activated, valid_until)
        .unwrap()
}

/// A record signed once and reused by tests that only need any valid bytes.
pub fn perpetual_record() -> &'static [u8] {
    static RECORD: OnceLock<Vec<u8>> = OnceLock::new();
    RECORD.get_or_init(|| signed_record(&device_key(), 0))
}

/// Issuer double that counts calls.
pub struct MockIssuer {
    pub reachable: bool,
    pub response: Mutex<Option<LicenseResult<Vec<u8>>>>,
    pub probes: AtomicUsize,
    pub requests: AtomicUsize,
}

impl MockIssuer {
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self {
            reachable: true,
            response: Mutex::new(Some(Ok(bytes))),
            probes: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            response: Mutex::new(None),
            probes: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            reachable: true,
            response: Mutex::new(Some(Err(LicenseError::IssuanceRejected {
                status,
                body: "no credits".into(),
            }))),
            probes: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.probes.load(Ordering::SeqCst) + self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteIssuer for MockIssuer {
    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn request(
        &self,
        _key: &ActivationKey,
        _request: &IssuanceRequest,
    ) -> LicenseResult<IssuedLicense> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let response = self
            .response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(LicenseError::Network("no response queued".into())));
        response.map(|bytes| IssuedLicense {
            bytes,
            suggested_name: None,
        })
    }
}

/// Device recovery double that counts reads.
pub struct MockRecovery {
    pub result: Mutex<Option<LicenseResult<Vec<u8>>>>,
    pub reads: AtomicUsize,
}

impl MockRecovery {
    pub fn holding(bytes: Vec<u8>) -> Self {
        Self {
            result: Mutex::new(Some(Ok(bytes))),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            result: Mutex::new(Some(Err(LicenseError::LicenseUnavailable(
                "device has no 'license' namespace".into(),
            )))),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Mutex::new(Some(Err(LicenseError::DeviceCommunication(
                "port vanished".into(),
            )))),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LicenseRecovery for MockRecovery {
    async fn recover(&self) -> LicenseResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(LicenseError::DeviceCommunication("already read".into())))
    }
}
