use bridgeprov::{CliArgs, ConfigError, DeviceCommand, MonitorSettings, ProvisionConfig};
use bridgeprov_device::ToolCommand;
use bridgeprov_license::LicenseType;
use clap::Parser;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FULL: &str = r#"
release_dir = "/srv/release/v2.3"
user_params = "customer_a.csv"
public_key = "keys/public.pem"
issue_url = "https://licenses.example.com/issue"
token = "tok_1234567890abcdef"
license_type = "evaluation"
validity_days = 30
start_index = 40
baud = 115200
settle_delay_ms = 500
ssid = "FieldUnit"

[tools]
esptool = "python -m esptool"
timeout_secs = 90
"#;

#[test]
fn empty_file_gives_defaults() {
    let config = ProvisionConfig::from_toml("", Path::new("provision.toml")).unwrap();
    assert_eq!(config, ProvisionConfig::default());
}

#[test]
fn file_values_are_read() {
    let config = ProvisionConfig::from_toml(FULL, Path::new("provision.toml")).unwrap();

    assert_eq!(config.release_dir, PathBuf::from("/srv/release/v2.3"));
    assert_eq!(config.license_type, LicenseType::Evaluation);
    assert_eq!(config.validity_days, 30);
    assert_eq!(config.start_index, 40);
    assert_eq!(config.baud, 115_200);
    assert_eq!(config.settle_delay(), Duration::from_millis(500));
    assert_eq!(config.ssid.as_deref(), Some("FieldUnit"));
    assert_eq!(config.tools.esptool, ToolCommand::parse("python -m esptool").unwrap());
    // untouched tools keep their defaults
    assert_eq!(config.tools.nvs_tool, ToolCommand::new("nvs_tool.py"));
    let esptool = config.tools.limited(&config.tools.esptool);
    assert_eq!(esptool.timeout(), Duration::from_secs(90));
    assert!(config.validate().is_ok());

    let request = config.issuance_request();
    assert_eq!(request.license_type, LicenseType::Evaluation);
    assert_eq!(request.validity_days, 30);

    let issuer = config.issuer().unwrap();
    assert_eq!(issuer.issue_url, "https://licenses.example.com/issue");
    assert_eq!(issuer.probe_timeout, Duration::from_secs(3));
}

#[test]
fn malformed_file_is_rejected() {
    let err = ProvisionConfig::from_toml("baud = \"fast\"", Path::new("bad.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
fn load_from_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProvisionConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn load_reads_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("station.toml");
    std::fs::write(&path, "start_index = 7\n").unwrap();

    let (config, source) = ProvisionConfig::load(Some(path.as_path())).unwrap();

    assert_eq!(source, Some(path));
    assert_eq!(config.start_index, 7);
    assert_eq!(config.baud, 460_800);
}

#[test]
fn server_url_without_token_is_invalid() {
    let config = ProvisionConfig {
        issue_url: Some("https://licenses.example.com/issue".into()),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    assert!(config.issuer().is_none());
}

#[test]
fn zero_baud_is_invalid() {
    let config = ProvisionConfig {
        baud: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn flags_override_file_values() {
    let mut config = ProvisionConfig::from_toml(FULL, Path::new("provision.toml")).unwrap();
    let args = CliArgs::try_parse_from([
        "bridgeprov",
        "--release",
        "./release",
        "--start-index",
        "3",
        "--baud",
        "921600",
        "--ip",
        "192.168.4.20",
    ])
    .unwrap();

    args.apply(&mut config);

    assert_eq!(config.release_dir, PathBuf::from("./release"));
    assert_eq!(config.start_index, 3);
    assert_eq!(config.baud, 921_600);
    assert_eq!(config.ip.as_deref(), Some("192.168.4.20"));
    // not given on the command line
    assert_eq!(config.user_params, PathBuf::from("customer_a.csv"));
    assert_eq!(config.ssid.as_deref(), Some("FieldUnit"));

    let overrides = config.overrides();
    assert_eq!(overrides.ip.as_deref(), Some("192.168.4.20"));
    assert_eq!(overrides.hostname, None);
}

#[test]
fn monitor_settings_follow_config() {
    let config = ProvisionConfig {
        start_index: 5,
        poll_interval_ms: 250,
        bell: false,
        ..Default::default()
    };
    let settings = MonitorSettings::from(&config);
    assert_eq!(settings.start_index, 5);
    assert_eq!(settings.poll_interval, Duration::from_millis(250));
    assert_eq!(settings.settle_delay, Duration::from_secs(2));
    assert!(!settings.bell);
}

#[test]
fn explicit_file_is_located_even_if_missing() {
    let path = Path::new("/nonexistent/station.toml");
    assert_eq!(ProvisionConfig::locate(Some(path)), Some(path.to_path_buf()));
    assert!(ProvisionConfig::load(Some(path)).is_err());
}

#[test]
fn station_runs_without_subcommand() {
    let args = CliArgs::try_parse_from(["bridgeprov", "--release", "./release"]).unwrap();
    assert_eq!(args.command, None);
}

#[test]
fn device_subcommands_parse() {
    let args = CliArgs::try_parse_from([
        "bridgeprov",
        "add-udp",
        "http://192.168.10.66/",
        "--ip",
        "192.168.10.22",
        "--port",
        "15540",
    ])
    .unwrap();
    assert_eq!(
        args.command,
        Some(DeviceCommand::AddUdp {
            device: "http://192.168.10.66/".into(),
            ip: "192.168.10.22".into(),
            port: 15540,
            no_save: false,
        })
    );

    let args = CliArgs::try_parse_from([
        "bridgeprov",
        "static-ip",
        "192.168.10.66",
        "--ip",
        "192.168.10.70",
        "--gateway",
        "192.168.10.1",
    ])
    .unwrap();
    let command = args.command.unwrap();
    assert_eq!(command.device(), "192.168.10.66");
    let DeviceCommand::StaticIp { netmask, .. } = command else {
        panic!("expected static-ip");
    };
    assert_eq!(netmask, "255.255.255.0");

    let args =
        CliArgs::try_parse_from(["bridgeprov", "ota", "192.168.10.66", "--app", "db_esp32.bin"])
            .unwrap();
    assert_eq!(
        args.command,
        Some(DeviceCommand::Ota {
            device: "192.168.10.66".into(),
            www: None,
            app: Some(PathBuf::from("db_esp32.bin")),
        })
    );
}
