//! Shared test helpers: tool doubles and a scratch provisioning station.

#![allow(dead_code)]

use async_trait::async_trait;
use bridgeprov::{DeviceTools, Provisioner};
use bridgeprov_device::{
    BinaryRenderer, ChipIdentity, DeviceError, DeviceResult, FlashMap, Flasher, IdentityProbe,
    PortScanner, Release,
};
use bridgeprov_license::{
    ActivationKey, LicenseAcquirer, LicenseCache, LicenseError, LicenseResult, LicenseSigner,
    LicenseType, LicenseVerifier, NvsEntry, NvsEntryKind, NvsValue, PartitionReader,
};
use bridgeprov_params::{IndexOverrides, ParamStore};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;

pub const TEMPLATE: &str = "\
# release template
key,type,encoding,value
settings,namespace,,
ip_sta,data,string,192.168.50.10
wifi_hostname,data,string,Drone10
ssid_ap,data,string,SSIDDrone10
baud,data,u32,115200
";

pub const C3_FLASH_ARGS: &str = "\
--flash_mode dio --flash_freq 80m --flash_size 4MB
0x0 bootloader/bootloader.bin
0x8000 partition_table/partition-table.bin
0x10000 db_esp32.bin
";

pub const C3_MAC: [u8; 6] = [0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc];

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("bridgeprov-license")
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn signer() -> &'static LicenseSigner {
    static SIGNER: OnceLock<LicenseSigner> = OnceLock::new();
    SIGNER.get_or_init(|| {
        let pem = fs::read_to_string(fixture("test_signing_key.pem")).unwrap();
        LicenseSigner::from_pem(&pem).unwrap()
    })
}

pub fn verifier() -> LicenseVerifier {
    LicenseVerifier::load(fixture("test_public_key.pem")).unwrap()
}

pub fn c3_identity() -> ChipIdentity {
    ChipIdentity {
        chip_name: "ESP32-C3".into(),
        chip_id: Some(5),
        revision: 4,
        mac: C3_MAC,
    }
}

pub fn c3_key() -> ActivationKey {
    ActivationKey::from_parts(C3_MAC, 5, 4)
}

/// A never-expiring record for the C3 test device, signed once.
pub fn c3_record() -> &'static [u8] {
    static RECORD: OnceLock<Vec<u8>> = OnceLock::new();
    RECORD.get_or_init(|| {
        signer()
            .encode(c3_key().as_str(), LicenseType::Activated, 0)
            .unwrap()
    })
}

/// Entries of a partition holding `record` in the reserved license slot.
pub fn license_entries(record: &[u8]) -> Vec<NvsEntry> {
    vec![
        NvsEntry {
            namespace: 0,
            kind: NvsEntryKind::U8,
            key: "license".into(),
            chunk_index: u8::MAX,
            value: NvsValue::Unsigned(3),
        },
        NvsEntry {
            namespace: 3,
            kind: NvsEntryKind::BlobIndex,
            key: "db_lic_key".into(),
            chunk_index: u8::MAX,
            value: NvsValue::BlobIndex {
                size: u32::try_from(record.len()).unwrap(),
                chunk_count: 1,
                chunk_start: 0,
            },
        },
        NvsEntry {
            namespace: 3,
            kind: NvsEntryKind::BlobData,
            key: "db_lic_key".into(),
            chunk_index: 0,
            value: NvsValue::Bytes(record.to_vec()),
        },
    ]
}

// ── Tool doubles ────────────────────────────────────────────────

pub struct MockProbe {
    identity: Result<ChipIdentity, String>,
    pub calls: AtomicUsize,
}

impl MockProbe {
    pub fn returning(identity: ChipIdentity) -> Self {
        Self {
            identity: Ok(identity),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            identity: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IdentityProbe for MockProbe {
    async fn identify(&self, _port: &str) -> DeviceResult<ChipIdentity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.identity
            .clone()
            .map_err(DeviceError::Communication)
    }
}

pub struct MockReader {
    entries: Option<Vec<NvsEntry>>,
    pub reads: AtomicUsize,
}

impl MockReader {
    pub fn holding(record: &[u8]) -> Self {
        Self {
            entries: Some(license_entries(record)),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn blank() -> Self {
        Self {
            entries: Some(Vec::new()),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            entries: None,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PartitionReader for MockReader {
    async fn read_entries(&self, _port: &str, _scratch_dir: &Path) -> LicenseResult<Vec<NvsEntry>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.entries
            .clone()
            .ok_or_else(|| LicenseError::DeviceCommunication("port vanished".into()))
    }
}

#[derive(Default)]
pub struct MockRenderer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BinaryRenderer for MockRenderer {
    async fn render(&self, params_csv: &Path, output: &Path, size: u32) -> DeviceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DeviceError::Render("generator exited with status 1".into()));
        }
        assert!(params_csv.is_file(), "renderer ran before params were written");
        fs::write(output, vec![0xff; size as usize])?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFlasher {
    pub fail: bool,
    /// Never finishes, like a tool stuck on an unresponsive port.
    pub hang: bool,
    pub flashed: Mutex<Vec<(String, FlashMap)>>,
}

impl MockFlasher {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.flashed.lock().unwrap().len()
    }

    pub fn flashed_ports(&self) -> Vec<String> {
        self.flashed
            .lock()
            .unwrap()
            .iter()
            .map(|(port, _)| port.clone())
            .collect()
    }
}

#[async_trait]
impl Flasher for MockFlasher {
    async fn flash(&self, port: &str, map: &FlashMap) -> DeviceResult<()> {
        self.flashed
            .lock()
            .unwrap()
            .push((port.to_string(), map.clone()));
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(DeviceError::Flash("A fatal error occurred: timed out".into()));
        }
        Ok(())
    }
}

/// Port list the tests change between polls.
#[derive(Default)]
pub struct MockPorts {
    ports: Mutex<BTreeSet<String>>,
    pub fail: Mutex<bool>,
}

impl MockPorts {
    pub fn with(ports: &[&str]) -> Self {
        let scanner = Self::default();
        scanner.set(ports);
        scanner
    }

    pub fn set(&self, ports: &[&str]) {
        *self.ports.lock().unwrap() = ports.iter().map(|p| (*p).to_string()).collect();
    }
}

impl PortScanner for MockPorts {
    fn scan(&self) -> DeviceResult<BTreeSet<String>> {
        if *self.fail.lock().unwrap() {
            return Err(DeviceError::Communication("enumeration failed".into()));
        }
        Ok(self.ports.lock().unwrap().clone())
    }
}

// ── Station ─────────────────────────────────────────────────────

/// A scratch provisioning station: release, cache and work directory
/// in a temp dir, with inspectable tool doubles.
pub struct Station {
    pub dir: TempDir,
    pub probe: Arc<MockProbe>,
    pub reader: Arc<MockReader>,
    pub renderer: Arc<MockRenderer>,
    pub flasher: Arc<MockFlasher>,
    pub cache: Arc<LicenseCache>,
    pub overrides: IndexOverrides,
}

impl Station {
    pub fn new(probe: MockProbe, reader: MockReader) -> Self {
        Self::with_tools(probe, reader, MockRenderer::default(), MockFlasher::default())
    }

    pub fn with_tools(
        probe: MockProbe,
        reader: MockReader,
        renderer: MockRenderer,
        flasher: MockFlasher,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let release = dir.path().join("release");
        let chip_dir = release.join("esp32c3_generic");
        fs::create_dir_all(&chip_dir).unwrap();
        fs::write(release.join("db_show_params.csv"), TEMPLATE).unwrap();
        fs::write(chip_dir.join("flash_args.txt"), C3_FLASH_ARGS).unwrap();
        let cache = Arc::new(LicenseCache::new(dir.path().join("licenses")));
        Self {
            dir,
            probe: Arc::new(probe),
            reader: Arc::new(reader),
            renderer: Arc::new(renderer),
            flasher: Arc::new(flasher),
            cache,
            overrides: IndexOverrides::default(),
        }
    }

    pub fn release_dir(&self) -> PathBuf {
        self.dir.path().join("release")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Session directory of the C3 test device.
    pub fn session_dir(&self) -> PathBuf {
        self.work_dir().join(c3_key().file_stem())
    }

    pub fn provisioner(&self) -> Provisioner {
        let tools = DeviceTools {
            probe: self.probe.clone(),
            reader: self.reader.clone(),
            renderer: self.renderer.clone(),
            flasher: self.flasher.clone(),
        };
        let acquirer = LicenseAcquirer::new(verifier(), self.cache.clone());
        let release = Release::open(self.release_dir()).unwrap();
        let merged = ParamStore::parse(TEMPLATE).unwrap();
        Provisioner::new(tools, Arc::new(acquirer), release, merged, self.work_dir())
            .with_overrides(self.overrides.clone())
    }
}
