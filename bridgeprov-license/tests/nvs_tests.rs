mod common;

use bridgeprov_license::{
    extract_license_blob, LicenseError, NvsEntry, NvsEntryKind, NvsValue, LICENSE_BLOB_KEY,
    LICENSE_NAMESPACE,
};
use common::{device_key, perpetual_record, verifier};
use pretty_assertions::assert_eq;

const LICENSE_NS: u8 = 3;

fn entry(namespace: u8, kind: NvsEntryKind, key: &str, chunk_index: u8, value: NvsValue) -> NvsEntry {
    NvsEntry {
        namespace,
        kind,
        key: key.to_string(),
        chunk_index,
        value,
    }
}

fn directory() -> Vec<NvsEntry> {
    vec![
        entry(0, NvsEntryKind::U8, "settings", 255, NvsValue::Unsigned(1)),
        entry(0, NvsEntryKind::U8, "wifi", 255, NvsValue::Unsigned(2)),
        entry(0, NvsEntryKind::U8, LICENSE_NAMESPACE, 255, NvsValue::Unsigned(u64::from(LICENSE_NS))),
        entry(1, NvsEntryKind::Str, "ssid_ap", 255, NvsValue::Text("Drone3".into())),
    ]
}

/// Splits `blob` into fragments, padding the last one the way flash pages do.
fn fragmented(blob: &[u8], chunk: usize) -> Vec<NvsEntry> {
    let mut entries = directory();
    let chunks: Vec<&[u8]> = blob.chunks(chunk).collect();
    entries.push(entry(
        LICENSE_NS,
        NvsEntryKind::BlobIndex,
        LICENSE_BLOB_KEY,
        255,
        NvsValue::BlobIndex {
            size: u32::try_from(blob.len()).unwrap(),
            chunk_count: u8::try_from(chunks.len()).unwrap(),
            chunk_start: 0,
        },
    ));
    // Stored out of order on purpose.
    for (i, part) in chunks.iter().enumerate().rev() {
        let mut data = part.to_vec();
        if i == chunks.len() - 1 {
            data.extend_from_slice(&[0xff; 5]);
        }
        entries.push(entry(
            LICENSE_NS,
            NvsEntryKind::BlobData,
            LICENSE_BLOB_KEY,
            u8::try_from(i).unwrap(),
            NvsValue::Bytes(data),
        ));
    }
    entries
}

#[test]
fn fragments_are_reassembled_and_trimmed() {
    let record = perpetual_record();
    let blob = extract_license_blob(&fragmented(record, 200)).unwrap();
    assert_eq!(blob, record);

    let verification = verifier()
        .decode_and_verify(&blob, Some(device_key().as_str()))
        .unwrap();
    assert!(verification.valid);
}

#[test]
fn stale_version_fragments_are_ignored() {
    let record = perpetual_record();
    let mut entries = fragmented(record, 300);
    // Leftover fragment of a previous blob version.
    entries.push(entry(
        LICENSE_NS,
        NvsEntryKind::BlobData,
        LICENSE_BLOB_KEY,
        128,
        NvsValue::Bytes(vec![0xaa; 64]),
    ));
    assert_eq!(extract_license_blob(&entries).unwrap(), record);
}

#[test]
fn same_key_in_other_namespace_is_ignored() {
    let mut entries = directory();
    entries.push(entry(
        1,
        NvsEntryKind::BlobData,
        LICENSE_BLOB_KEY,
        0,
        NvsValue::Bytes(vec![1; 10]),
    ));
    let err = extract_license_blob(&entries).unwrap_err();
    assert!(matches!(err, LicenseError::LicenseUnavailable(_)));
}

#[test]
fn missing_fragment_is_malformed() {
    let record = perpetual_record();
    let entries: Vec<NvsEntry> = fragmented(record, 200)
        .into_iter()
        .filter(|e| !(e.kind == NvsEntryKind::BlobData && e.chunk_index == 1))
        .collect();
    let err = extract_license_blob(&entries).unwrap_err();
    assert!(matches!(err, LicenseError::MalformedLicense(_)));
}

#[test]
fn empty_partition_has_no_license() {
    let err = extract_license_blob(&[]).unwrap_err();
    assert!(matches!(err, LicenseError::LicenseUnavailable(_)));
}

#[test]
fn entries_deserialize_from_json() {
    let json = r#"[
        {"namespace":0,"kind":"u8","key":"license","chunk_index":255,"value":{"Unsigned":3}},
        {"namespace":3,"kind":"blob","key":"db_lic_key","chunk_index":0,"value":{"Bytes":[1,2,3]}}
    ]"#;
    let entries: Vec<NvsEntry> = serde_json::from_str(json).unwrap();
    assert_eq!(entries[1].kind, NvsEntryKind::Blob);
    assert_eq!(extract_license_blob(&entries).unwrap(), vec![1, 2, 3]);
}
