use std::path::{Path, PathBuf};

use prefsync_store::{
    Durability, FileStore, JsonCodec, PrefCodec, StoreLocator, StoreResult, DEFAULT_BASE_DIR_ENV,
    DEFAULT_FILE_NAME,
};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::source::StoreSource;

/// Configuration for where and how an engine persists preferences.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// file_name = "settings.json"
/// base_dir = "/var/lib/myapp"
/// durability = "os_default"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store file name inside the application directory.
    pub file_name: String,
    /// Base directory override. Takes precedence over the environment and
    /// the platform configuration directory.
    pub base_dir: Option<PathBuf>,
    /// Environment variable naming a base directory. Empty or `None`
    /// disables the lookup.
    pub base_dir_env: Option<String>,
    /// Flush strategy for writes.
    pub durability: Durability,
    /// Pretty-print the store file.
    pub pretty: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            base_dir: None,
            base_dir_env: Some(DEFAULT_BASE_DIR_ENV.to_string()),
            durability: Durability::default(),
            pretty: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML config file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn codec(&self) -> JsonCodec {
        JsonCodec::new(self.pretty)
    }

    pub fn locator(&self) -> StoreLocator {
        let mut locator = StoreLocator::new()
            .with_file_name(self.file_name.clone())
            .with_extension(self.codec().extension())
            .with_base_dir_env(self.base_dir_env.clone().filter(|v| !v.is_empty()));
        if let Some(dir) = &self.base_dir {
            locator = locator.with_base_dir(dir);
        }
        locator
    }

    /// Resolve `source` and open a file store for it.
    pub fn open_store(&self, source: &StoreSource) -> StoreResult<FileStore> {
        let handle = self
            .locator()
            .resolve(source.app_name(), source.explicit_path())?;
        Ok(FileStore::new(handle)
            .with_codec(self.codec())
            .with_durability(self.durability))
    }
}
