//! Fleet provisioning station.
//!
//! Watches the serial ports of this host and, for every device plugged in,
//! identifies it, secures a signed license for it, builds its indexed
//! configuration and flashes the release.
//!
//! Usage:
//!   bridgeprov --release ./release --params my_params.csv --token <TOKEN>
//!   bridgeprov ota http://192.168.10.66/ --www www.bin --app db_esp32.bin
//!
//! Individual device failures are logged; the exit code only reflects
//! whether the station itself could start and run.

use anyhow::{bail, Context, Result};
use bridgeprov::{
    CliArgs, DeviceTools, HotplugMonitor, LogContext, MonitorSettings, ProvisionConfig,
    Provisioner, DEFAULT_LOG_DIR, DEFAULT_LOG_PREFIX, OTA_STEP_PAUSE,
};
use bridgeprov_device::{DeviceApi, Esptool, NvsPartitionGen, NvsToolReader, Release, SystemPorts};
use bridgeprov_license::{mask_token, HttpIssuer, LicenseAcquirer, LicenseCache, LicenseVerifier};
use bridgeprov_params::merge_files;
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Merged release template plus user parameters, before indexing.
const MERGED_PARAMS_FILE: &str = "merged_params.csv";

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let (mut config, config_source) = ProvisionConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let log = LogContext::new(DEFAULT_LOG_DIR, DEFAULT_LOG_PREFIX);
    log.configure_file(&config.log_dir, &config.log_prefix);
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log.clone())
        .with_ansi(false)
        .with_target(false)
        .init();

    info!("bridgeprov starting...");
    if let Some(path) = log.file_path() {
        info!(path = %path.display(), "logging to file");
    }
    match &config_source {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => info!("no configuration file found, using defaults"),
    }
    debug!(?config, "effective configuration");
    config.validate()?;

    if let Some(command) = &args.command {
        let api = DeviceApi::new(command.device())?;
        command.execute(&api, OTA_STEP_PAUSE).await?;
        info!(device = %api.base_url(), "device request done");
        return Ok(());
    }

    match config.token.as_deref() {
        Some(token) => info!(token = %mask_token(token), "license server token"),
        None => warn!("no license server token, running offline"),
    }

    if !config.user_params.is_file() {
        bail!("user parameter file {} not found", config.user_params.display());
    }
    let release = Release::open(&config.release_dir)
        .with_context(|| format!("opening release {}", config.release_dir.display()))?;
    info!(
        release = %release.dir().display(),
        chips = ?release.chips(),
        "release ready"
    );

    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("creating {}", config.work_dir.display()))?;
    let outcome = merge_files(
        &config.user_params,
        release.template_path(),
        config.work_dir.join(MERGED_PARAMS_FILE),
    )?;

    let verifier = LicenseVerifier::load(&config.public_key)
        .with_context(|| format!("loading public key {}", config.public_key.display()))?;
    let cache = Arc::new(LicenseCache::new(&config.cache_dir));
    let mut acquirer = LicenseAcquirer::new(verifier, cache);
    if let Some(issuer) = config.issuer() {
        info!(url = %issuer.issue_url, "remote issuance enabled");
        let issuer = Arc::new(HttpIssuer::new(issuer)?);
        acquirer = acquirer.with_issuer(issuer, config.issuance_request());
    }

    let tools_config = &config.tools;
    let esptool = Esptool::new(tools_config.limited(&tools_config.esptool), config.baud);
    let tools = DeviceTools {
        probe: Arc::new(esptool.clone()),
        reader: Arc::new(NvsToolReader::new(
            esptool.clone(),
            tools_config.limited(&tools_config.nvs_tool),
        )),
        renderer: Arc::new(NvsPartitionGen::new(
            tools_config.limited(&tools_config.nvs_partition_gen),
        )),
        flasher: Arc::new(esptool),
    };
    let provisioner = Provisioner::new(
        tools,
        Arc::new(acquirer),
        release,
        outcome.merged,
        &config.work_dir,
    )
    .with_overrides(config.overrides());

    let scanner = Arc::new(SystemPorts {
        usb_only: config.usb_only,
    });
    let mut monitor = HotplugMonitor::new(scanner, provisioner, MonitorSettings::from(&config));
    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(next_index = monitor.next_index(), "bridgeprov stopped");
    Ok(())
}
