//! Configuration module for the photo download tool
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\photo_download_tool\config.toml
//! - Linux/macOS: ~/.config/photo_download_tool/config.toml

use crate::core::sequences::SEQUENCES_FILE_NAME;
use crate::naming::templates::{
    DEFAULT_DESTINATION_TEMPLATE, DEFAULT_IMAGE_TEMPLATE, TEMPLATES_FILE_NAME,
};
use crate::worker::Hosting;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config and data directories
pub const APP_NAME: &str = "photo_download_tool";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default previously-downloaded database file name
const DOWNLOADED_DB_NAME: &str = "downloaded.db";

/// Get the standard configuration directory for the application.
///
/// Returns:
/// - Windows: %APPDATA%\photo_download_tool
/// - Linux/macOS: ~/.config/photo_download_tool
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Directory holding the durable state files (sequences, database)
pub fn get_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Ensure the configuration directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = get_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| ConfigError::WriteError(config_dir.clone(), e.to_string()))?;
    }

    Ok(config_dir)
}

/// Initialize the configuration file if it doesn't exist.
///
/// Returns the path to the config file.
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let config_dir = ensure_config_dir()?;
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    if !config_path.exists() {
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// How downloaded images are transferred to their destination
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Copy the file, leaving the source untouched
    #[default]
    Copy,
    /// Move the file, removing it from the source
    Move,
}

/// How workers are hosted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HostingMode {
    /// One child process per worker
    #[default]
    Process,
    /// One thread per worker, in-process channels
    Thread,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Download settings
    pub download: DownloadConfig,

    /// Scanner settings
    pub scanner: ScannerConfig,

    /// Worker hosting settings
    pub workers: WorkersConfig,

    /// External metadata tool
    pub exiftool: ExifToolConfig,

    /// Durable state locations
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root folder the destination template is rendered under
    pub destination: PathBuf,

    /// Scan subdirectories of the source
    pub include_subdirs: bool,

    /// Key of the image naming template
    pub image_template: String,

    /// Key of the destination naming template
    pub destination_template: String,

    /// Session label applied to every image
    pub session: String,

    /// Copy or move
    pub transfer: TransferMode,

    /// Skip images found in the previously-downloaded store
    pub skip_previously_downloaded: bool,
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Number of images per published batch
    pub batch_size: usize,
}

/// Worker hosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// "process" or "thread"
    pub hosting: HostingMode,

    /// Channel poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Grace period before a stopping worker is terminated
    pub stop_timeout_ms: u64,

    /// Program launched for process workers (empty = current executable)
    pub program: PathBuf,
}

/// ExifTool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExifToolConfig {
    /// Path or name of the exiftool executable
    pub program: PathBuf,
}

/// Storage configuration
///
/// Empty paths resolve to the platform data/config directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Sequence counters file
    pub sequences_file: PathBuf,

    /// Custom naming templates file
    pub templates_file: PathBuf,

    /// Previously-downloaded SQLite database
    pub downloaded_db: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::new(), // Empty = must be given on the command line
            include_subdirs: true,
            image_template: DEFAULT_IMAGE_TEMPLATE.to_string(),
            destination_template: DEFAULT_DESTINATION_TEMPLATE.to_string(),
            session: String::new(),
            transfer: TransferMode::Copy,
            skip_previously_downloaded: true,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            hosting: HostingMode::Process,
            poll_interval_ms: 10,
            stop_timeout_ms: 250,
            program: PathBuf::new(),
        }
    }
}

impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Resolve the hosting of worker processes
    ///
    /// `config_path` is forwarded to child processes so they read the same file.
    pub fn to_hosting(&self, config_path: Option<&Path>) -> Hosting {
        match self.hosting {
            HostingMode::Thread => Hosting::Thread,
            HostingMode::Process => {
                let program = if self.program.as_os_str().is_empty() {
                    std::env::current_exe().unwrap_or_else(|_| PathBuf::from("photo-downloader"))
                } else {
                    self.program.clone()
                };
                Hosting::Process {
                    program,
                    config: config_path.map(Path::to_path_buf),
                }
            }
        }
    }
}

impl Default for ExifToolConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("exiftool"),
        }
    }
}

impl StorageConfig {
    fn resolve(path: &Path, base: Option<PathBuf>, file_name: &str) -> PathBuf {
        if !path.as_os_str().is_empty() {
            return path.to_path_buf();
        }
        base.map(|dir| dir.join(file_name))
            .unwrap_or_else(|| PathBuf::from(file_name))
    }

    pub fn sequences_path(&self) -> PathBuf {
        Self::resolve(&self.sequences_file, get_data_dir(), SEQUENCES_FILE_NAME)
    }

    pub fn templates_path(&self) -> PathBuf {
        Self::resolve(&self.templates_file, get_config_dir(), TEMPLATES_FILE_NAME)
    }

    pub fn downloaded_db_path(&self) -> PathBuf {
        Self::resolve(&self.downloaded_db, get_data_dir(), DOWNLOADED_DB_NAME)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./photo_download.log"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./config.toml (current directory - for development/override)
    /// 2. ./photo_download.toml (current directory - alternative name)
    /// 3. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// First existing config file in the search order
    pub fn find_config_file() -> Option<PathBuf> {
        let local_paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("./photo_download.toml"),
        ];

        if let Some(path) = local_paths.iter().find(|p| p.exists()) {
            return Some(path.clone());
        }

        get_config_path().filter(|p| p.exists())
    }

    /// Get the path where the config file is (or would be) located.
    pub fn get_active_config_path() -> PathBuf {
        Self::find_config_file()
            .or_else(get_config_path)
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    FileNotFound(PathBuf),
    /// Failed to read the configuration file
    ReadError(PathBuf, String),
    /// Failed to parse the configuration file (invalid TOML)
    ParseError(PathBuf, String),
    /// Failed to serialize configuration to TOML
    SerializeError(String),
    /// Failed to write configuration file
    WriteError(PathBuf, String),
    /// Could not determine config directory
    ConfigDirNotFound,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    err
                )
            }
            ConfigError::ParseError(path, err) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    err
                )
            }
            ConfigError::SerializeError(err) => {
                write!(f, "Failed to serialize configuration: {}", err)
            }
            ConfigError::WriteError(path, err) => {
                write!(
                    f,
                    "Failed to write config file '{}': {}",
                    path.display(),
                    err
                )
            }
            ConfigError::ConfigDirNotFound => {
                write!(f, "Could not determine configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scanner.batch_size, 500);
        assert_eq!(config.workers.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.workers.stop_timeout(), Duration::from_millis(250));
        assert_eq!(config.workers.hosting, HostingMode::Process);
        assert_eq!(config.download.transfer, TransferMode::Copy);
        assert_eq!(config.download.image_template, DEFAULT_IMAGE_TEMPLATE);
        assert_eq!(config.exiftool.program, PathBuf::from("exiftool"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.scanner.batch_size, defaults.scanner.batch_size);
        assert_eq!(config.workers.hosting, defaults.workers.hosting);
        assert_eq!(config.download.transfer, defaults.download.transfer);
        assert_eq!(
            config.download.destination_template,
            defaults.download.destination_template
        );
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [download]
            transfer = "move"
            session = "Trip"

            [workers]
            hosting = "thread"
            "#,
        )
        .unwrap();
        assert_eq!(config.download.transfer, TransferMode::Move);
        assert_eq!(config.download.session, "Trip");
        assert!(config.download.include_subdirs);
        assert_eq!(config.workers.hosting, HostingMode::Thread);
        assert_eq!(config.workers.poll_interval_ms, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = Config::load(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[download\nsession = ").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError(_, _))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.download.destination = PathBuf::from("/photos");
        config.scanner.batch_size = 10;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.download.destination, PathBuf::from("/photos"));
        assert_eq!(loaded.scanner.batch_size, 10);
    }

    #[test]
    fn test_storage_paths() {
        let storage = StorageConfig {
            sequences_file: PathBuf::from("/tmp/seq.json"),
            ..Default::default()
        };
        assert_eq!(storage.sequences_path(), PathBuf::from("/tmp/seq.json"));
        assert!(storage.templates_path().ends_with(TEMPLATES_FILE_NAME));
        assert!(storage.downloaded_db_path().ends_with(DOWNLOADED_DB_NAME));
    }

    #[test]
    fn test_thread_hosting() {
        let workers = WorkersConfig {
            hosting: HostingMode::Thread,
            ..Default::default()
        };
        assert!(matches!(workers.to_hosting(None), Hosting::Thread));
    }
}
