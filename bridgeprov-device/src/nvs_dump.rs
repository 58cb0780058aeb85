//! Reading and decoding the device's key-value partition.
//!
//! The partition is dumped with the flashing tool and decoded by the
//! partition tool's JSON output. The JSON is walked loosely so that both the
//! paged layout (`{"pages": [{"entries": [...]}]}`) and a flat entry list
//! are accepted.

use crate::error::{DeviceError, DeviceResult};
use crate::esptool::Esptool;
use crate::release::{CONFIG_PARTITION_ADDRESS, CONFIG_PARTITION_SIZE};
use crate::tool::ToolCommand;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bridgeprov_license::{
    LicenseError, LicenseResult, NvsEntry, NvsEntryKind, NvsValue, PartitionReader,
};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// File name of the raw partition dump inside the scratch directory.
pub const PARTITION_DUMP_FILE: &str = "partition_dump.bin";

/// Maps the decoder's type names onto entry kinds.
fn entry_kind(name: &str) -> NvsEntryKind {
    match name {
        "uint8_t" | "u8" => NvsEntryKind::U8,
        "int8_t" | "i8" => NvsEntryKind::I8,
        "uint16_t" | "u16" => NvsEntryKind::U16,
        "int16_t" | "i16" => NvsEntryKind::I16,
        "uint32_t" | "u32" => NvsEntryKind::U32,
        "int32_t" | "i32" => NvsEntryKind::I32,
        "uint64_t" | "u64" => NvsEntryKind::U64,
        "int64_t" | "i64" => NvsEntryKind::I64,
        "string" | "str" => NvsEntryKind::Str,
        "blob_index" => NvsEntryKind::BlobIndex,
        "blob_data" => NvsEntryKind::BlobData,
        "blob" => NvsEntryKind::Blob,
        other => NvsEntryKind::Other(other.to_string()),
    }
}

fn as_u8(value: Option<&Value>) -> Option<u8> {
    value.and_then(Value::as_u64).and_then(|v| u8::try_from(v).ok())
}

fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => BASE64.decode(text.trim()).ok(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect(),
        _ => None,
    }
}

fn entry_value(kind: &NvsEntryKind, data: &Value) -> NvsValue {
    match kind {
        NvsEntryKind::BlobIndex => {
            let size = data.get("size").and_then(Value::as_u64);
            let count = as_u8(data.get("chunk_count"));
            let start = as_u8(data.get("chunk_start"));
            match (size.and_then(|s| u32::try_from(s).ok()), count, start) {
                (Some(size), Some(chunk_count), Some(chunk_start)) => NvsValue::BlobIndex {
                    size,
                    chunk_count,
                    chunk_start,
                },
                _ => NvsValue::Empty,
            }
        }
        NvsEntryKind::BlobData | NvsEntryKind::Blob => data
            .get("value")
            .and_then(bytes_of)
            .map_or(NvsValue::Empty, NvsValue::Bytes),
        NvsEntryKind::Str => data
            .get("value")
            .and_then(Value::as_str)
            .map_or(NvsValue::Empty, |s| NvsValue::Text(s.to_string())),
        NvsEntryKind::I8 | NvsEntryKind::I16 | NvsEntryKind::I32 | NvsEntryKind::I64 => data
            .get("value")
            .and_then(Value::as_i64)
            .map_or(NvsValue::Empty, NvsValue::Signed),
        NvsEntryKind::Other(_) => NvsValue::Empty,
        _ => data
            .get("value")
            .and_then(Value::as_u64)
            .map_or(NvsValue::Empty, NvsValue::Unsigned),
    }
}

fn parse_entry(raw: &Value) -> Option<NvsEntry> {
    if let Some(state) = raw.get("state").and_then(Value::as_str) {
        if !state.eq_ignore_ascii_case("written") {
            return None;
        }
    }
    let metadata = raw.get("metadata")?;
    let kind = entry_kind(metadata.get("type")?.as_str()?);
    let namespace = as_u8(metadata.get("namespace"))?;
    let chunk_index = as_u8(metadata.get("chunk_index")).unwrap_or(u8::MAX);
    let key = raw.get("key")?.as_str()?.to_string();
    let value = raw
        .get("data")
        .map_or(NvsValue::Empty, |data| entry_value(&kind, data));
    Some(NvsEntry {
        namespace,
        kind,
        key,
        chunk_index,
        value,
    })
}

/// Converts the partition decoder's JSON output into entries.
///
/// Entries that are not in the written state are skipped.
///
/// # Errors
///
/// Returns [`DeviceError::ToolOutput`] if `json` is not valid JSON or has
/// no entry list.
pub fn parse_nvs_json(json: &str) -> DeviceResult<Vec<NvsEntry>> {
    let root: Value = serde_json::from_str(json)
        .map_err(|e| DeviceError::ToolOutput(format!("partition decoder JSON: {e}")))?;

    let raw_entries: Vec<&Value> = if let Some(pages) = root.get("pages").and_then(Value::as_array)
    {
        pages
            .iter()
            .filter_map(|page| page.get("entries").and_then(Value::as_array))
            .flatten()
            .collect()
    } else if let Some(entries) = root.as_array() {
        entries.iter().collect()
    } else {
        return Err(DeviceError::ToolOutput(
            "partition decoder JSON has no entries".to_string(),
        ));
    };

    Ok(raw_entries.into_iter().filter_map(parse_entry).collect())
}

/// [`PartitionReader`] that dumps the configuration partition with the
/// flashing tool and decodes it with the partition tool.
#[derive(Debug, Clone)]
pub struct NvsToolReader {
    esptool: Esptool,
    decoder: ToolCommand,
}

impl NvsToolReader {
    pub fn new(esptool: Esptool, decoder: ToolCommand) -> Self {
        Self { esptool, decoder }
    }

    async fn read(&self, port: &str, scratch_dir: &Path) -> DeviceResult<Vec<NvsEntry>> {
        tokio::fs::create_dir_all(scratch_dir).await?;
        let dump = scratch_dir.join(PARTITION_DUMP_FILE);
        info!(port, dump = %dump.display(), "reading configuration partition");
        self.esptool
            .read_flash(port, CONFIG_PARTITION_ADDRESS, CONFIG_PARTITION_SIZE, &dump)
            .await?;

        let args = [
            "--format".to_string(),
            "json".to_string(),
            "--dump".to_string(),
            "written".to_string(),
            dump.display().to_string(),
        ];
        let out = self
            .decoder
            .run(&args)
            .await
            .map_err(|e| DeviceError::ToolOutput(format!("cannot run {}: {e}", self.decoder)))?;
        if !out.success {
            return Err(DeviceError::ToolOutput(out.failure("partition decoder")));
        }
        let entries = parse_nvs_json(&out.stdout)?;
        debug!(port, entries = entries.len(), "decoded configuration partition");
        Ok(entries)
    }
}

#[async_trait]
impl PartitionReader for NvsToolReader {
    async fn read_entries(&self, port: &str, scratch_dir: &Path) -> LicenseResult<Vec<NvsEntry>> {
        self.read(port, scratch_dir)
            .await
            .map_err(|e| LicenseError::DeviceCommunication(e.to_string()))
    }
}
