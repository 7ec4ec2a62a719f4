//! Resolution of the filesystem location of a preferences store.
//!
//! Without an explicit path, an application's store lives at
//! `<base>/<sanitized app name>/<file name>`, where `<base>` is, in order:
//!
//! 1. the locator's base directory override
//! 2. the base directory environment variable (`PREFSYNC_CONFIG_DIR`)
//! 3. the platform configuration directory
//!    - Linux: `$XDG_CONFIG_HOME` or `~/.config`
//!    - macOS: `~/Library/Application Support`
//!    - Windows: `%APPDATA%`
//! 4. the user's home directory

use std::fs;
use std::path::{Path, PathBuf};

use prefsync_types::StoreHandle;
use tracing::{debug, warn};

use crate::error::LocationError;
use crate::file::write_target;

/// File name used when none is configured.
pub const DEFAULT_FILE_NAME: &str = "preferences.json";

/// Environment variable consulted for a base directory override.
pub const DEFAULT_BASE_DIR_ENV: &str = "PREFSYNC_CONFIG_DIR";

/// Characters replaced by `_` when turning an application name into a
/// directory name. Covers path separators and names Windows refuses.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Resolves [`StoreHandle`]s for applications.
#[derive(Clone, Debug)]
pub struct StoreLocator {
    base_dir: Option<PathBuf>,
    base_dir_env: Option<String>,
    file_name: String,
    extension: String,
}

impl StoreLocator {
    /// Locator using the default file name, the default environment variable
    /// and the platform directories.
    pub fn new() -> Self {
        Self {
            base_dir: None,
            base_dir_env: Some(DEFAULT_BASE_DIR_ENV.to_string()),
            file_name: DEFAULT_FILE_NAME.to_string(),
            extension: "json".to_string(),
        }
    }

    /// Use `dir` as the base directory, ignoring the environment and the
    /// platform directories.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Environment variable holding a base directory override. `None`
    /// disables the lookup.
    pub fn with_base_dir_env(mut self, var: Option<String>) -> Self {
        self.base_dir_env = var;
        self
    }

    /// Name of the store file inside the application directory.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Extension the store file must carry; appended when missing.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The validated store file name, with the extension appended if the
    /// configured name lacks it.
    pub fn file_name(&self) -> Result<String, LocationError> {
        let name = self.file_name.as_str();
        let invalid = |reason: &str| LocationError::InvalidFileName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(invalid("file name must not be empty"));
        }
        if name.contains(FORBIDDEN_CHARS) || name.chars().any(char::is_control) {
            return Err(invalid("file name must not contain separators or special characters"));
        }
        if name.chars().all(|c| c == '.') {
            return Err(invalid("file name must not consist of dots only"));
        }

        let suffix = format!(".{}", self.extension);
        if self.extension.is_empty() || name.ends_with(&suffix) {
            return Ok(name.to_string());
        }
        let fixed = format!("{name}{suffix}");
        warn!(configured = name, used = %fixed, "store file name lacks extension; appending it");
        Ok(fixed)
    }

    /// The base directory application directories are created under.
    pub fn base_dir(&self) -> Result<PathBuf, LocationError> {
        if let Some(dir) = &self.base_dir {
            return Ok(dir.clone());
        }
        if let Some(var) = &self.base_dir_env {
            if let Some(value) = std::env::var_os(var).filter(|v| !v.is_empty()) {
                debug!(var = %var, "using base directory from environment");
                return Ok(PathBuf::from(value));
            }
        }
        let dirs = directories::BaseDirs::new().ok_or(LocationError::NoBaseDirectory)?;
        let config = dirs.config_dir();
        if !config.as_os_str().is_empty() {
            return Ok(config.to_path_buf());
        }
        let home = dirs.home_dir();
        if home.as_os_str().is_empty() {
            return Err(LocationError::NoBaseDirectory);
        }
        Ok(home.to_path_buf())
    }

    /// Resolve the store handle for `app_name`, or use `explicit_path`
    /// verbatim when given.
    ///
    /// Creates missing parent directories and checks that the location is
    /// writable. Does not create the store file.
    pub fn resolve(
        &self,
        app_name: &str,
        explicit_path: Option<&Path>,
    ) -> Result<StoreHandle, LocationError> {
        let handle = match explicit_path {
            Some(path) => StoreHandle::new(path),
            None => {
                let dir_name = sanitize_app_name(app_name)?;
                StoreHandle::new(self.base_dir()?.join(dir_name).join(self.file_name()?))
            }
        };
        prepare(&handle)?;
        debug!(store = %handle, "resolved preferences store");
        Ok(handle)
    }
}

impl Default for StoreLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an application name into a single directory name.
///
/// Separators and characters that are not portable in file names become
/// `_`. Names that are empty after trimming, or consist only of dots, are
/// rejected.
///
/// # Examples
///
/// ```
/// use prefsync_store::sanitize_app_name;
///
/// assert_eq!(sanitize_app_name("My App").unwrap(), "My App");
/// assert_eq!(sanitize_app_name("acme/roadrunner").unwrap(), "acme_roadrunner");
/// assert!(sanitize_app_name("  ").is_err());
/// assert!(sanitize_app_name("..").is_err());
/// ```
pub fn sanitize_app_name(name: &str) -> Result<String, LocationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LocationError::InvalidAppName {
            name: name.to_string(),
            reason: "application name must not be empty".into(),
        });
    }
    if trimmed.chars().all(|c| c == '.') {
        return Err(LocationError::InvalidAppName {
            name: name.to_string(),
            reason: "application name must not consist of dots only".into(),
        });
    }
    Ok(trimmed
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect())
}

/// Create the store's directory and verify the location can be written.
fn prepare(handle: &StoreHandle) -> Result<(), LocationError> {
    let dir = handle.directory();
    fs::create_dir_all(dir).map_err(|source| LocationError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = handle.path();
    if let Ok(meta) = fs::metadata(path) {
        if !meta.is_file() {
            return Err(LocationError::NotWritable {
                path: path.to_path_buf(),
                reason: "not a regular file".into(),
            });
        }
        if meta.permissions().readonly() {
            return Err(LocationError::NotWritable {
                path: path.to_path_buf(),
                reason: "file is read-only".into(),
            });
        }
    }

    // Atomic writes create a temp file beside the file they replace, so that
    // directory must accept new files.
    let target = write_target(path).map_err(|e| LocationError::NotWritable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let probe_dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => dir,
    };
    tempfile::tempfile_in(probe_dir).map_err(|e| LocationError::NotWritable {
        path: probe_dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}
