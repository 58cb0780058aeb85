mod common;

use bridgeprov_device::{parse_identity, DeviceError, SupportedChip};
use bridgeprov_license::ActivationKey;
use common::{READ_MAC_V4, READ_MAC_V5};
use pretty_assertions::assert_eq;

#[test]
fn parses_chip_is_dialect() {
    let identity = parse_identity(READ_MAC_V4).unwrap();
    assert_eq!(identity.chip_name, "ESP32-C3");
    assert_eq!(identity.chip_id, Some(5));
    assert_eq!(identity.revision, 4);
    assert_eq!(identity.mac, [0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc]);
    assert_eq!(identity.supported_chip().unwrap(), SupportedChip::Esp32C3);
}

#[test]
fn parses_chip_type_dialect() {
    let identity = parse_identity(READ_MAC_V5).unwrap();
    assert_eq!(identity.chip_name, "ESP32-C6");
    assert_eq!(identity.chip_id, Some(13));
    assert_eq!(identity.revision, 1);
    assert_eq!(identity.mac_string(), "40:4c:ca:01:02:03");
}

#[test]
fn major_revision_is_scaled() {
    let out = "Chip is ESP32-C5 (QFN28) (revision v1.2)\nMAC: 00:11:22:33:44:55\n";
    let identity = parse_identity(out).unwrap();
    assert_eq!(identity.revision, 102);
    assert_eq!(identity.supported_chip().unwrap(), SupportedChip::Esp32C5);
}

#[test]
fn unsupported_chip_is_reported() {
    let out = "Chip is ESP32-S3 (QFN56) (revision v0.2)\nMAC: 00:11:22:33:44:55\n";
    let identity = parse_identity(out).unwrap();
    assert_eq!(identity.chip_id, Some(9));
    assert!(matches!(
        identity.supported_chip(),
        Err(DeviceError::UnsupportedHardware(_))
    ));

    let out = "Chip type: MYSTERY (revision v0.1)\nMAC: 00:11:22:33:44:55\n";
    let identity = parse_identity(out).unwrap();
    assert_eq!(identity.chip_id, None);
    assert!(identity.supported_chip().is_err());
}

#[test]
fn missing_fields_are_tool_output_errors() {
    assert!(matches!(
        parse_identity("Serial port /dev/ttyACM0\nA fatal error occurred"),
        Err(DeviceError::ToolOutput(_))
    ));
    assert!(matches!(
        parse_identity("Chip is ESP32-C3 (QFN32) (revision v0.4)\n"),
        Err(DeviceError::ToolOutput(_))
    ));
}

#[tokio::test]
async fn identity_derives_activation_key() {
    let mut identity = parse_identity(READ_MAC_V4).unwrap();
    let key = ActivationKey::derive(&mut identity).await.unwrap();
    assert_eq!(
        key,
        ActivationKey::from_parts([0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc], 5, 4)
    );
}
