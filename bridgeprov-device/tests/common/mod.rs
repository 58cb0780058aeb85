//! Shared test helpers for device tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const C3_FLASH_ARGS: &str = "\
--flash_mode dio --flash_freq 80m --flash_size 4MB
0x0 bootloader/bootloader.bin
0x10000 db_esp32.bin
0x8000 partition_table/partition-table.bin
0x110000 www.bin
";

/// esptool 4.x `read_mac` output.
pub const READ_MAC_V4: &str = "\
esptool.py v4.7.0
Serial port /dev/ttyACM0
Connecting...
Detecting chip type... ESP32-C3
Chip is ESP32-C3 (QFN32) (revision v0.4)
Features: WiFi, BLE
Crystal is 40MHz
MAC: 24:6f:28:aa:bb:cc
Uploading stub...
Running stub...
Stub running...
MAC: 24:6f:28:aa:bb:cc
Hard resetting via RTS pin...
";

/// esptool 5.x `read-mac` output.
pub const READ_MAC_V5: &str = "\
esptool v5.0.0
Connected to ESP32-C6 on /dev/ttyACM1:
Chip type:          ESP32-C6 (QFN40) (revision v0.1)
Features:           Wi-Fi 6, BT 5 (LE), IEEE802.15.4, Single Core, 160MHz
Crystal frequency:  40MHz
MAC:                40:4c:ca:01:02:03
BASE MAC:           40:4c:ca:01:02:03
MAC_EXT:            ff:fe

Stub flasher running.

Hard resetting via RTS pin...
";

/// Creates a release directory with a template and the given chip folders.
pub fn make_release(root: &Path, chips: &[(&str, Option<&str>)]) -> PathBuf {
    let release = root.join("release");
    fs::create_dir_all(&release).unwrap();
    fs::write(
        release.join("db_show_params.csv"),
        "key,type,encoding,value\nsettings,namespace,,\nssid_ap,data,string,Drone1\n",
    )
    .unwrap();
    for (folder, flash_args) in chips {
        let dir = release.join(folder);
        fs::create_dir_all(&dir).unwrap();
        if let Some(args) = flash_args {
            fs::write(dir.join("flash_args.txt"), args).unwrap();
        }
    }
    release
}

/// Writes a shell script to be run through `sh`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{body}\n")).unwrap();
    path
}
