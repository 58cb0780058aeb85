//! License record wire format and RSA-PSS signature verification.
//!
//! A license file is a flat little-endian record:
//!
//! ```text
//! activation_key (variable) | license_type: u32 | valid_until: i64 | signature: [u8; 512]
//! ```
//!
//! The record is parsed from the fixed 528-byte tail; everything before the
//! tail is the activation key. The signature covers
//! `activation_key || license_type || valid_until` and uses RSA-PSS with
//! MGF1-SHA-256 over the SHA-256 digest of that payload.

use crate::error::{LicenseError, LicenseResult};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Length of the RSA signature at the end of every record.
pub const SIGNATURE_LEN: usize = 512;

/// Length of the fixed tail: type + timestamp + signature.
pub const TAIL_LEN: usize = 4 + 8 + SIGNATURE_LEN;

const DIGEST_LEN: usize = 32;

/// The license type (aligned with the issuing service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Limited trial.
    Trial,
    /// Time-boxed evaluation.
    Evaluation,
    /// Fully activated.
    Activated,
    /// Marked expired by the issuer.
    Expired,
    /// A type code this client does not know.
    Unknown(u32),
}

impl LicenseType {
    /// Maps a wire value to a license type.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Trial,
            1 => Self::Evaluation,
            2 => Self::Activated,
            3 => Self::Expired,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub fn as_raw(&self) -> u32 {
        match self {
            Self::Trial => 0,
            Self::Evaluation => 1,
            Self::Activated => 2,
            Self::Expired => 3,
            Self::Unknown(raw) => *raw,
        }
    }
}

/// A structurally parsed, not yet verified, license record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    activation_key: Vec<u8>,
    license_type: u32,
    valid_until: i64,
    signature: Vec<u8>,
}

impl LicenseRecord {
    /// Parses record bytes without checking the signature.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedLicense`] if `bytes` cannot hold the
    /// fixed tail.
    pub fn parse(bytes: &[u8]) -> LicenseResult<Self> {
        if bytes.len() < TAIL_LEN {
            return Err(LicenseError::MalformedLicense(format!(
                "{} bytes is shorter than the {TAIL_LEN}-byte record tail",
                bytes.len()
            )));
        }
        let (key, tail) = bytes.split_at(bytes.len() - TAIL_LEN);
        let (type_bytes, rest) = tail.split_at(4);
        let (time_bytes, signature) = rest.split_at(8);

        let mut raw_type = [0u8; 4];
        raw_type.copy_from_slice(type_bytes);
        let mut raw_time = [0u8; 8];
        raw_time.copy_from_slice(time_bytes);

        Ok(Self {
            activation_key: key.to_vec(),
            license_type: u32::from_le_bytes(raw_type),
            valid_until: i64::from_le_bytes(raw_time),
            signature: signature.to_vec(),
        })
    }

    /// Serializes the record to its wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signed_payload();
        out.extend_from_slice(&self.signature);
        out
    }

    /// The bytes covered by the signature.
    #[must_use]
    pub fn signed_payload(&self) -> Vec<u8> {
        signed_payload(&self.activation_key, self.license_type, self.valid_until)
    }

    /// The activation key the record was issued to.
    #[must_use]
    pub fn activation_key(&self) -> String {
        String::from_utf8_lossy(&self.activation_key).into_owned()
    }

    /// The license type.
    #[must_use]
    pub fn license_type(&self) -> LicenseType {
        LicenseType::from_raw(self.license_type)
    }

    /// Expiry as unix seconds; `0` never expires.
    #[must_use]
    pub fn valid_until(&self) -> i64 {
        self.valid_until
    }

    /// The raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Returns the decoded summary of this record.
    #[must_use]
    pub fn info(&self) -> LicenseInfo {
        LicenseInfo {
            activation_key: self.activation_key(),
            license_type: self.license_type(),
            valid_until: self.valid_until,
        }
    }
}

fn signed_payload(activation_key: &[u8], license_type: u32, valid_until: i64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(activation_key.len() + 12);
    payload.extend_from_slice(activation_key);
    payload.extend_from_slice(&license_type.to_le_bytes());
    payload.extend_from_slice(&valid_until.to_le_bytes());
    payload
}

/// Decoded fields of a license record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    /// Activation key the license is bound to.
    pub activation_key: String,
    /// License type.
    pub license_type: LicenseType,
    /// Expiry as unix seconds; `0` never expires.
    pub valid_until: i64,
}

impl LicenseInfo {
    /// Returns the expiry timestamp, or None if the license never expires.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.valid_until == 0 {
            None
        } else {
            DateTime::from_timestamp(self.valid_until, 0)
        }
    }

    /// Returns true if the license expired before `now` (unix seconds).
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.valid_until != 0 && self.valid_until < now
    }

    /// Returns true if the license has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Returns true if this license stays valid strictly longer than `other`.
    #[must_use]
    pub fn outlasts(&self, other: &LicenseInfo) -> bool {
        match (self.valid_until, other.valid_until) {
            (_, 0) => false,
            (0, _) => true,
            (mine, theirs) => mine > theirs,
        }
    }
}

/// Why a well-formed record was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Signature does not verify against the trusted key.
    SignatureInvalid,
    /// Signature verifies but the record belongs to other hardware.
    WrongDevice {
        /// Activation key embedded in the record.
        found: String,
        /// Activation key that was required.
        expected: String,
    },
}

/// Outcome of [`LicenseVerifier::decode_and_verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// True if the record is trusted and bound to the expected device.
    pub valid: bool,
    /// Decoded fields (present even when invalid, for diagnostics).
    pub info: LicenseInfo,
    /// Reason for rejection when `valid` is false.
    pub rejection: Option<Rejection>,
}

impl Verification {
    /// Converts a rejected verification into the matching error.
    pub fn into_result(self) -> LicenseResult<LicenseInfo> {
        match self.rejection {
            None => Ok(self.info),
            Some(Rejection::SignatureInvalid) => Err(LicenseError::SignatureInvalid),
            Some(Rejection::WrongDevice { found, expected }) => {
                Err(LicenseError::WrongDevice { found, expected })
            }
        }
    }
}

/// Verifies license records against the trusted public key.
#[derive(Debug, Clone)]
pub struct LicenseVerifier {
    key: RsaPublicKey,
}

impl LicenseVerifier {
    /// Wraps an already parsed public key.
    #[must_use]
    pub fn new(key: RsaPublicKey) -> Self {
        Self { key }
    }

    /// Parses a PEM public key (SubjectPublicKeyInfo or PKCS#1).
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| LicenseError::Key(format!("invalid public key PEM: {e}")))?;
        Ok(Self::new(key))
    }

    /// Loads a PEM public key from disk.
    pub fn load(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let pem = fs::read_to_string(path.as_ref())?;
        Self::from_pem(&pem)
    }

    /// Parses `bytes` and checks the signature and, if given, the device
    /// binding.
    ///
    /// Signature failure is reported through [`Verification::valid`], not
    /// as an error.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedLicense`] if `bytes` is too short.
    pub fn decode_and_verify(
        &self,
        bytes: &[u8],
        expected_activation_key: Option<&str>,
    ) -> LicenseResult<Verification> {
        let record = LicenseRecord::parse(bytes)?;
        let info = record.info();

        let rejection = if !self.signature_matches(&record) {
            Some(Rejection::SignatureInvalid)
        } else {
            match expected_activation_key {
                Some(expected) if expected != info.activation_key => Some(Rejection::WrongDevice {
                    found: info.activation_key.clone(),
                    expected: expected.to_string(),
                }),
                _ => None,
            }
        };

        Ok(Verification {
            valid: rejection.is_none(),
            info,
            rejection,
        })
    }

    /// Reads a license file and verifies it.
    pub fn verify_file(
        &self,
        path: impl AsRef<Path>,
        expected_activation_key: Option<&str>,
    ) -> LicenseResult<Verification> {
        let bytes = fs::read(path.as_ref())?;
        self.decode_and_verify(&bytes, expected_activation_key)
    }

    fn signature_matches(&self, record: &LicenseRecord) -> bool {
        let digest = Sha256::digest(record.signed_payload());
        // Accept both the maximum salt length and the digest-length salt.
        [max_salt_len(&self.key), DIGEST_LEN].into_iter().any(|salt| {
            self.key
                .verify(Pss::new_with_salt::<Sha256>(salt), &digest, record.signature())
                .is_ok()
        })
    }
}

fn max_salt_len(key: &RsaPublicKey) -> usize {
    let em_len = (key.n().bits() - 1).div_ceil(8);
    em_len.saturating_sub(DIGEST_LEN + 2)
}

/// Issuer-side key used to produce license records.
#[derive(Clone)]
pub struct LicenseSigner {
    key: RsaPrivateKey,
}

impl std::fmt::Debug for LicenseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl LicenseSigner {
    /// Parses a PEM private key (PKCS#8 or PKCS#1).
    pub fn from_pem(pem: &str) -> LicenseResult<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| LicenseError::Key(format!("invalid private key PEM: {e}")))?;
        Ok(Self { key })
    }

    /// Returns a verifier for records produced by this signer.
    #[must_use]
    pub fn verifier(&self) -> LicenseVerifier {
        LicenseVerifier::new(self.key.to_public_key())
    }

    /// Produces signed record bytes.
    pub fn encode(
        &self,
        activation_key: &str,
        license_type: LicenseType,
        valid_until: i64,
    ) -> LicenseResult<Vec<u8>> {
        let public = self.key.to_public_key();
        if public.size() != SIGNATURE_LEN {
            return Err(LicenseError::Key(format!(
                "signing key produces {}-byte signatures, records need {SIGNATURE_LEN}",
                public.size()
            )));
        }

        let mut record = signed_payload(activation_key.as_bytes(), license_type.as_raw(), valid_until);
        let digest = Sha256::digest(&record);
        let signature = self
            .key
            .sign_with_rng(
                &mut OsRng,
                Pss::new_with_salt::<Sha256>(max_salt_len(&public)),
                &digest,
            )
            .map_err(|e| LicenseError::Key(format!("signing failed: {e}")))?;
        record.extend_from_slice(&signature);
        Ok(record)
    }
}

/// Produces signed record bytes with `signer`.
pub fn encode(
    activation_key: &str,
    license_type: LicenseType,
    valid_until: i64,
    signer: &LicenseSigner,
) -> LicenseResult<Vec<u8>> {
    signer.encode(activation_key, license_type, valid_until)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_type_wire_values() {
        for raw in 0..4 {
            assert_eq!(LicenseType::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(LicenseType::from_raw(2), LicenseType::Activated);
        assert_eq!(LicenseType::from_raw(9), LicenseType::Unknown(9));
    }

    #[test]
    fn parse_splits_fixed_tail() {
        let mut bytes = b"KEY".to_vec();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&1_700_000_000i64.to_le_bytes());
        bytes.extend_from_slice(&[7u8; SIGNATURE_LEN]);

        let record = LicenseRecord::parse(&bytes).unwrap();
        assert_eq!(record.activation_key(), "KEY");
        assert_eq!(record.license_type(), LicenseType::Activated);
        assert_eq!(record.valid_until(), 1_700_000_000);
        assert_eq!(record.to_bytes(), bytes);
    }

    #[test]
    fn parse_rejects_short_input() {
        let err = LicenseRecord::parse(&[0u8; TAIL_LEN - 1]).unwrap_err();
        assert!(matches!(err, LicenseError::MalformedLicense(_)));
    }

    #[test]
    fn outlasts_treats_zero_as_forever() {
        let info = |valid_until| LicenseInfo {
            activation_key: "k".into(),
            license_type: LicenseType::Activated,
            valid_until,
        };
        assert!(info(0).outlasts(&info(100)));
        assert!(!info(100).outlasts(&info(0)));
        assert!(!info(0).outlasts(&info(0)));
        assert!(info(200).outlasts(&info(100)));
        assert!(!info(100).outlasts(&info(100)));
    }
}
