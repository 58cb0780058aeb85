//! Shared test helpers for parameter tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// The per-device section of a release template.
pub const DEVICE_PARAMS: &str = "# Comment line\n\
key,type,encoding,value\n\
settings,namespace,,\n\
ip_sta,data,string,192.168.50.10\n\
wifi_hostname,data,string,Drone\n\
ssid_ap,data,string,SSIDDrone\n\
wifi_brcst_port,data,u16,14550\n";

/// A release template with two namespaces.
pub const RELEASE_PARAMS: &str = "# DroneBridge release parameters\n\
# generated for testing\n\
key,type,encoding,value\n\
settings,namespace,,\n\
a,data,string,release-a\n\
b,data,u8,1\n\
radio,namespace,,\n\
c,data,u16,2000\n";

/// A user file that lacks `a` and carries the obsolete `d`.
pub const USER_PARAMS: &str = "key,type,encoding,value\n\
settings,namespace,,\n\
d,data,string,gone\n\
c,data,u16,1500\n\
b,data,u8,7\n";

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
