//! Recovery of an installed license from a decoded on-device key-value
//! partition.
//!
//! Decoding the partition image is done by an external tool; this module
//! only works on the decoded entry list. The reserved layout is:
//!
//! - a `u8` entry in namespace 0 keyed `license` whose value is the numeric
//!   id of the license namespace,
//! - inside that namespace, a blob keyed `db_lic_key`: one index entry with
//!   the total size plus one or more data fragments ordered by chunk index.

use crate::error::{LicenseError, LicenseResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Namespace that holds the namespace-name → id entries.
pub const NAMESPACE_DIRECTORY: u8 = 0;
/// Name of the reserved license namespace.
pub const LICENSE_NAMESPACE: &str = "license";
/// Key of the license blob.
pub const LICENSE_BLOB_KEY: &str = "db_lic_key";

/// Entry type as reported by the partition decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NvsEntryKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Str,
    /// Header of a multi-fragment blob.
    BlobIndex,
    /// One fragment of a multi-fragment blob.
    BlobData,
    /// Single-entry blob written by older partition formats.
    Blob,
    /// Any other type; ignored.
    Other(String),
}

impl NvsEntryKind {
    fn is_fragment(&self) -> bool {
        matches!(self, Self::BlobData | Self::Blob)
    }
}

/// Decoded value of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NvsValue {
    Unsigned(u64),
    Signed(i64),
    Text(String),
    Bytes(Vec<u8>),
    BlobIndex {
        /// Total blob size in bytes.
        size: u32,
        /// Number of data fragments.
        chunk_count: u8,
        /// Chunk index of the first fragment.
        chunk_start: u8,
    },
    Empty,
}

/// One decoded partition entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvsEntry {
    /// Numeric namespace id.
    pub namespace: u8,
    /// Entry type.
    pub kind: NvsEntryKind,
    /// Entry key.
    pub key: String,
    /// Fragment index for blob data entries.
    pub chunk_index: u8,
    /// Decoded value.
    pub value: NvsValue,
}

/// Reads the key-value partition of the device attached to a port.
///
/// `scratch_dir` receives any intermediate files (raw dump) so they can be
/// inspected after a failed session.
#[async_trait]
pub trait PartitionReader: Send + Sync {
    /// Reads and decodes the partition.
    async fn read_entries(&self, port: &str, scratch_dir: &Path) -> LicenseResult<Vec<NvsEntry>>;
}

/// Reassembles the license blob stored under the reserved layout.
///
/// # Errors
///
/// Returns [`LicenseError::LicenseUnavailable`] if the device holds no
/// license and [`LicenseError::MalformedLicense`] if the stored blob is
/// incomplete.
pub fn extract_license_blob(entries: &[NvsEntry]) -> LicenseResult<Vec<u8>> {
    let namespace_id = entries
        .iter()
        .find(|e| {
            e.namespace == NAMESPACE_DIRECTORY
                && e.kind == NvsEntryKind::U8
                && e.key == LICENSE_NAMESPACE
        })
        .and_then(|e| match e.value {
            NvsValue::Unsigned(id) => u8::try_from(id).ok(),
            _ => None,
        })
        .ok_or_else(|| {
            LicenseError::LicenseUnavailable(format!(
                "device has no '{LICENSE_NAMESPACE}' namespace"
            ))
        })?;
    debug!(namespace_id, "found license namespace");

    let scoped = || {
        entries
            .iter()
            .filter(move |e| e.namespace == namespace_id && e.key == LICENSE_BLOB_KEY)
    };

    let index = scoped().find_map(|e| match e.value {
        NvsValue::BlobIndex {
            size,
            chunk_count,
            chunk_start,
        } if e.kind == NvsEntryKind::BlobIndex => Some((size, chunk_count, chunk_start)),
        _ => None,
    });

    let mut fragments: Vec<(u8, &[u8])> = scoped()
        .filter(|e| e.kind.is_fragment())
        .filter(|e| match index {
            Some((_, count, start)) => {
                let chunk = u16::from(e.chunk_index);
                let start = u16::from(start);
                chunk >= start && chunk < start + u16::from(count)
            }
            None => true,
        })
        .filter_map(|e| match &e.value {
            NvsValue::Bytes(bytes) => Some((e.chunk_index, bytes.as_slice())),
            _ => None,
        })
        .collect();

    if fragments.is_empty() {
        return Err(LicenseError::LicenseUnavailable(format!(
            "no '{LICENSE_BLOB_KEY}' blob in license namespace"
        )));
    }
    fragments.sort_by_key(|(chunk, _)| *chunk);

    let mut blob: Vec<u8> = fragments.iter().flat_map(|(_, b)| b.iter().copied()).collect();
    if let Some((size, _, _)) = index {
        let size = size as usize;
        if blob.len() < size {
            return Err(LicenseError::MalformedLicense(format!(
                "license blob has {} of {size} bytes",
                blob.len()
            )));
        }
        blob.truncate(size);
    }
    Ok(blob)
}
