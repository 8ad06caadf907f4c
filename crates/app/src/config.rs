use std::{fs, path::PathBuf};

use grid_store::{ObjectStoreConfig, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "gridfuse";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "grid.db";
pub const OBJECTS_DIR_NAME: &str = "objects";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Bytes per chunk for newly written files
    #[serde(default = "default_chunk_size", alias = "mongo_chunk_size")]
    pub chunk_size: u64,
    /// Default log level, overridable with RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (logs to stdout only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            log_level: default_log_level(),
            log_dir: None,
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Reject values the mount cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}

/// Where file records and chunk objects live.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (defaults to <config dir>/grid.db)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Chunk object backend (defaults to <config dir>/objects on disk)
    #[serde(default)]
    pub objects: Option<ObjectStoreConfig>,
}

/// Metadata cache of the FUSE layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl_secs() -> u64 {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the gridfuse directory (~/.gridfuse)
    pub dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: Config,
}

impl AppState {
    /// Get the gridfuse directory path (custom or default ~/.gridfuse)
    pub fn dir(custom_path: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new gridfuse directory with a config file
    pub fn init(custom_path: Option<PathBuf>, config: Option<Config>) -> Result<Self, ConfigError> {
        let dir = Self::dir(custom_path)?;
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            return Err(ConfigError::AlreadyInitialized);
        }

        let mut config = config.unwrap_or_default();
        config.validate()?;
        // Spell out the on-disk layout so the file documents itself
        if config.store.db_path.is_none() {
            config.store.db_path = Some(dir.join(DB_FILE_NAME));
        }
        if config.store.objects.is_none() {
            config.store.objects = Some(ObjectStoreConfig::Local {
                path: dir.join(OBJECTS_DIR_NAME),
            });
        }

        fs::create_dir_all(&dir)?;
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the gridfuse directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let dir = Self::dir(custom_path)?;
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(ConfigError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_toml)?;
        config.validate()?;

        Ok(Self {
            dir,
            config_path,
            config,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.config
            .store
            .db_path
            .clone()
            .unwrap_or_else(|| self.dir.join(DB_FILE_NAME))
    }

    pub fn objects(&self) -> ObjectStoreConfig {
        self.config
            .store
            .objects
            .clone()
            .unwrap_or_else(|| ObjectStoreConfig::Local {
                path: self.dir.join(OBJECTS_DIR_NAME),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("gridfuse not initialized. Run 'gridfuse init' first")]
    NotInitialized,

    #[error("gridfuse already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid chunk size {0}: must be positive")]
    InvalidChunkSize(u64),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("gridfuse");

        let state = AppState::init(Some(dir.clone()), None).unwrap();
        assert!(state.config_path.exists());
        assert_eq!(state.db_path(), dir.join(DB_FILE_NAME));

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, state.config);
        assert_eq!(
            loaded.objects(),
            ObjectStoreConfig::Local {
                path: dir.join(OBJECTS_DIR_NAME)
            }
        );

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(ConfigError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp_dir.path().to_path_buf())),
            Err(ConfigError::NotInitialized)
        ));
    }

    #[test]
    fn test_defaults_and_alias() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.chunk_size, 255 * 1024);

        let config: Config = toml::from_str("mongo_chunk_size = 1024").unwrap();
        assert_eq!(config.chunk_size, 1024);

        let config: Config = toml::from_str(
            r#"
            chunk_size = 4096
            log_level = "debug"

            [store.objects]
            type = "memory"

            [cache]
            ttl_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(config.store.objects, Some(ObjectStoreConfig::Memory));
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.cache.max_entries, 10_000);
    }

    #[test]
    fn test_validate() {
        let config = Config {
            chunk_size: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidChunkSize(0))
        ));

        let config = Config {
            log_level: "chatty".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
