use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ledger::replace_file;
use crate::limits::*;
use crate::retry::RetryPolicy;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "malformed config: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

// ── File sections ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingLotSection {
    pub total_spaces: u32,
    pub hourly_rate: f64,
}

impl Default for ParkingLotSection {
    fn default() -> Self {
        Self {
            total_spaces: 100,
            hourly_rate: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// Presentation settings. Carried through untouched for the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiSection {
    pub window_title: String,
    pub window_size: WindowSize,
    /// Status refresh period in milliseconds.
    pub refresh_rate: u64,
}

impl Default for GuiSection {
    fn default() -> Self {
        Self {
            window_title: "Parking Lot Management".into(),
            window_size: WindowSize {
                width: 800,
                height: 600,
            },
            refresh_rate: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub records_file: String,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            records_file: "parking_records.csv".into(),
        }
    }
}

/// Model paths for the detection layer, relative to the config file.
/// Either may be absent; the bookkeeping core never reads them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yolo_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lprnet_model: Option<String>,
}

/// On-disk shape of the configuration document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub parking_lot: ParkingLotSection,
    #[serde(default)]
    pub gui: GuiSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelPaths>,
    /// Sections this crate does not know about, preserved on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigFile {
    fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.parking_lot.hourly_rate;
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_HOURLY_RATE {
            return Err(ConfigError::Invalid("hourly_rate must be positive"));
        }
        if self.parking_lot.total_spaces > MAX_TOTAL_SPACES {
            return Err(ConfigError::Invalid("total_spaces too large"));
        }
        if self.data.records_file.trim().is_empty() {
            return Err(ConfigError::Invalid("records_file is empty"));
        }
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────

/// Directory relative ledger names resolve against, from the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Owns the configuration file. Read once at startup, rewritten in full on
/// every mutation.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    file: ConfigFile,
    data_dir: PathBuf,
    retry: RetryPolicy,
}

impl ConfigStore {
    /// Load the config at `path`, writing defaults out if the file is absent.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let file = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<ConfigFile>(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let store = Self::with_file(path, ConfigFile::default());
                store.save()?;
                tracing::info!("wrote default config to {}", store.path.display());
                return Ok(store);
            }
            Err(e) => return Err(e.into()),
        };
        file.validate()?;
        Ok(Self::with_file(path, file))
    }

    /// Build a store around an in-memory document without touching disk.
    pub fn with_file(path: impl Into<PathBuf>, file: ConfigFile) -> Self {
        Self {
            path: path.into(),
            file,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override where relative `records_file` names are placed.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }

    pub fn total_spaces(&self) -> u32 {
        self.file.parking_lot.total_spaces
    }

    pub fn hourly_rate(&self) -> f64 {
        self.file.parking_lot.hourly_rate
    }

    pub fn gui(&self) -> &GuiSection {
        &self.file.gui
    }

    fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Ledger path. Relative names live under the data directory (`data/`
    /// in the working directory unless overridden).
    pub fn records_path(&self) -> PathBuf {
        let name = Path::new(&self.file.data.records_file);
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.data_dir.join(name)
        }
    }

    fn model_path(&self, pick: impl Fn(&ModelPaths) -> Option<&String>) -> Option<PathBuf> {
        let models = self.file.models.as_ref()?;
        pick(models).map(|p| self.base_dir().join(p))
    }

    /// Plate detector weights, resolved against the config directory.
    pub fn detector_model_path(&self) -> Option<PathBuf> {
        self.model_path(|m| m.yolo_model.as_ref())
    }

    /// Character recogniser weights, resolved against the config directory.
    pub fn recogniser_model_path(&self) -> Option<PathBuf> {
        self.model_path(|m| m.lprnet_model.as_ref())
    }

    /// Write the whole document, creating parent directories as needed.
    pub fn save(&self) -> io::Result<()> {
        let mut text = serde_json::to_string_pretty(&self.file).map_err(io::Error::other)?;
        text.push('\n');
        self.retry.run(|_| replace_file(&self.path, text.as_bytes()))
    }

    /// Set the hourly rate and persist. The previous value is kept on failure.
    pub fn set_hourly_rate(&mut self, rate: f64) -> io::Result<()> {
        let previous = self.file.parking_lot.hourly_rate;
        self.file.parking_lot.hourly_rate = rate;
        self.save().inspect_err(|_| {
            self.file.parking_lot.hourly_rate = previous;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("parklot_test_config").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = test_dir("defaults");
        let path = dir.join("nested").join("config.json");

        let store = ConfigStore::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.total_spaces(), 100);
        assert_eq!(store.hourly_rate(), 5.0);
        assert_eq!(store.file().data.records_file, "parking_records.csv");
        assert_eq!(store.records_path(), Path::new("data").join("parking_records.csv"));

        // Reloading reads back the same document
        let again = ConfigStore::load(&path).unwrap();
        assert_eq!(again.file(), store.file());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = test_dir("partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"parking_lot": {"total_spaces": 7}}"#).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.total_spaces(), 7);
        assert_eq!(store.hourly_rate(), 5.0);
        assert_eq!(store.gui().refresh_rate, 1000);
        assert!(store.detector_model_path().is_none());
        assert!(store.recogniser_model_path().is_none());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = test_dir("malformed");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ConfigStore::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn non_positive_rate_rejected() {
        let dir = test_dir("bad_rate");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"parking_lot": {"hourly_rate": 0}}"#).unwrap();

        let err = ConfigStore::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn set_hourly_rate_persists() {
        let dir = test_dir("set_rate");
        let path = dir.join("config.json");
        let mut store = ConfigStore::load(&path).unwrap();

        store.set_hourly_rate(7.5).unwrap();
        assert_eq!(store.hourly_rate(), 7.5);
        assert_eq!(ConfigStore::load(&path).unwrap().hourly_rate(), 7.5);
    }

    #[test]
    fn relative_records_file_resolves_against_data_dir() {
        let store = ConfigStore::with_file("config/config.json", ConfigFile::default());
        assert_eq!(store.data_dir(), Path::new("data"));
        assert_eq!(store.records_path(), PathBuf::from("data/parking_records.csv"));

        let mut file = ConfigFile::default();
        file.data.records_file = "lot_b.csv".into();
        let store =
            ConfigStore::with_file("config/config.json", file).with_data_dir("/srv/parklot");
        assert_eq!(store.records_path(), PathBuf::from("/srv/parklot/lot_b.csv"));
    }

    #[test]
    fn partial_models_section_loads() {
        let dir = test_dir("partial_models");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"models": {"yolo_model": "models/yolo.pt"}}"#).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.detector_model_path(), Some(dir.join("models/yolo.pt")));
        assert_eq!(store.recogniser_model_path(), None);
    }

    #[test]
    fn unknown_sections_survive_rewrite() {
        let dir = test_dir("extra");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(
            &path,
            r#"{
                "parking_lot": {"total_spaces": 10, "hourly_rate": 2},
                "models": {"yolo_model": "models/yolo.pt", "lprnet_model": "models/lpr.pth"},
                "camera": {"index": 1}
            }"#,
        )
        .unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        store.set_hourly_rate(3.0).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["camera"]["index"], 1);
        assert_eq!(raw["parking_lot"]["hourly_rate"], 3.0);

        assert_eq!(store.detector_model_path(), Some(dir.join("models/yolo.pt")));
        assert_eq!(store.recogniser_model_path(), Some(dir.join("models/lpr.pth")));
    }

    #[test]
    fn failed_write_keeps_previous_rate() {
        let dir = test_dir("failed_write");
        let path = dir.join("config.json");
        let mut store = ConfigStore::load(&path)
            .unwrap()
            .with_retry_policy(RetryPolicy::none());

        // A directory where the file should be makes the rename fail
        fs::remove_file(&path).unwrap();
        fs::create_dir_all(path.join("blocker")).unwrap();

        assert!(store.set_hourly_rate(9.0).is_err());
        assert_eq!(store.hourly_rate(), 5.0);
    }

    #[test]
    fn absolute_records_file_used_as_is() {
        let dir = test_dir("absolute");
        let ledger = dir.join("elsewhere.csv");
        let mut file = ConfigFile::default();
        file.data.records_file = ledger.to_string_lossy().into_owned();
        let store = ConfigStore::with_file(dir.join("config.json"), file);
        assert_eq!(store.records_path(), ledger);
    }
}
