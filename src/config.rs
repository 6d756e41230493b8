use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Which persistence substrate to use: `"sqlite"` or `"redb"`.
    pub backend: String,
    pub sqlite_path: String,
    pub redb_path: String,
    pub default_user: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_engram_dir();
        Self {
            backend: "sqlite".into(),
            sqlite_path: dir.join("memory.db").to_string_lossy().into_owned(),
            redb_path: dir.join("memory.redb").to_string_lossy().into_owned(),
            default_user: "default_user".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_engram_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

/// Returns `~/.engram/`
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (ENGRAM_BACKEND, ENGRAM_DB,
    /// ENGRAM_KV, ENGRAM_USER, ENGRAM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_BACKEND") {
            self.storage.backend = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_DB") {
            self.storage.sqlite_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_KV") {
            self.storage.redb_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_USER") {
            self.storage.default_user = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Resolve the active backend's database path, expanding `~` if needed.
    pub fn resolved_store_path(&self) -> PathBuf {
        match self.storage.backend.as_str() {
            "redb" => expand_tilde(&self.storage.redb_path),
            _ => expand_tilde(&self.storage.sqlite_path),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
