//! File-backed preference store with atomic replacement.
//!
//! A write encodes the mapping into a named temp file next to the target
//! (same directory, hence same filesystem), flushes it, and renames it over
//! the target. Readers in this or any other process see either the old file
//! or the new one. If anything fails before the rename, the temp file is
//! removed and the target is untouched.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use prefsync_types::{PrefMap, StoreHandle};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::codec::{JsonCodec, PrefCodec};
use crate::error::{StoreError, StoreResult};
use crate::traits::PreferenceStore;

/// Flush strategy for store writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// `fsync` the temp file before the rename and the directory after it.
    Sync,
    /// Rely on OS page-cache buffering. The rename is still atomic, but a
    /// power loss may lose the latest write.
    OsDefault,
}

impl Default for Durability {
    fn default() -> Self {
        Self::Sync
    }
}

/// Preference store backed by a single file.
pub struct FileStore {
    handle: StoreHandle,
    codec: Box<dyn PrefCodec>,
    durability: Durability,
}

impl FileStore {
    /// Store at `handle` using pretty JSON and synced writes.
    pub fn new(handle: StoreHandle) -> Self {
        Self {
            handle,
            codec: Box::new(JsonCodec::default()),
            durability: Durability::default(),
        }
    }

    pub fn with_codec(mut self, codec: impl PrefCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn codec(&self) -> &dyn PrefCodec {
        self.codec.as_ref()
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Raw bytes of the store file, or `None` if it does not exist.
    pub fn read_raw(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.handle.path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path_buf(),
                source,
            }),
        }
    }

    /// First phase of a write: encode `map` into a temp file beside the
    /// target. The target is not touched until [`StagedWrite::commit`];
    /// dropping the staged write discards it.
    pub fn stage(&self, map: &PrefMap) -> StoreResult<StagedWrite> {
        let bytes = self.codec.encode(map).map_err(|source| StoreError::Encode {
            path: self.path_buf(),
            source,
        })?;

        let write_err = |source: io::Error| StoreError::Write {
            path: self.path_buf(),
            source,
        };

        let target = write_target(self.handle.path()).map_err(write_err)?;
        if target != self.handle.path() {
            debug!(store = %self.handle, target = %target.display(), "writing through symlink");
        }
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("preferences");

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(write_err)?;
        temp.write_all(&bytes).map_err(write_err)?;
        temp.flush().map_err(write_err)?;
        if self.durability == Durability::Sync {
            temp.as_file().sync_all().map_err(write_err)?;
        }

        // Keep permissions a user set on the existing file.
        if let Ok(meta) = fs::metadata(&target) {
            fs::set_permissions(temp.path(), meta.permissions()).map_err(write_err)?;
        }

        Ok(StagedWrite {
            temp,
            target,
            codec: self.codec.name(),
            durability: self.durability,
            len: bytes.len(),
        })
    }

    fn path_buf(&self) -> PathBuf {
        self.handle.path().to_path_buf()
    }
}

impl PreferenceStore for FileStore {
    fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    fn read(&self) -> StoreResult<PrefMap> {
        let Some(bytes) = self.read_raw()? else {
            debug!(store = %self.handle, "store file absent; reading empty mapping");
            return Ok(PrefMap::new());
        };
        let map = self.codec.decode(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path_buf(),
            source,
        })?;
        debug!(
            store = %self.handle,
            codec = self.codec.name(),
            keys = map.len(),
            bytes = bytes.len(),
            "store read"
        );
        Ok(map)
    }

    fn write(&self, map: &PrefMap) -> StoreResult<()> {
        self.stage(map)?.commit()
    }

    fn exists(&self) -> StoreResult<bool> {
        self.handle
            .path()
            .try_exists()
            .map_err(|source| StoreError::Read {
                path: self.path_buf(),
                source,
            })
    }
}

/// An encoded mapping waiting in a temp file to replace the store file.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
    codec: &'static str,
    durability: Durability,
    len: usize,
}

impl StagedWrite {
    /// Location of the temp file holding the staged content.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically replace the store file with the staged content.
    pub fn commit(self) -> StoreResult<()> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| StoreError::Write {
                path: target.clone(),
                source: e.error,
            })?;

        if self.durability == Durability::Sync {
            sync_parent_dir(&target);
        }
        debug!(store = %target.display(), codec = self.codec, bytes = self.len, "store written");
        Ok(())
    }
}

/// The file a write to `path` must replace: `path` itself, or the file it
/// links to when `path` is a symlink. Renaming over the link would turn it
/// into a regular file and detach it from its target.
pub(crate) fn write_target(path: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => match fs::canonicalize(path) {
            Ok(resolved) => Ok(resolved),
            // Dangling link: the write creates the file it names.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let link = fs::read_link(path)?;
                Ok(match path.parent() {
                    Some(dir) => dir.join(link),
                    None => link,
                })
            }
            Err(e) => Err(e),
        },
        _ => Ok(path.to_path_buf()),
    }
}

/// Make the rename itself durable. The new content is already in place when
/// this runs, so a failure is only logged.
#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    let Some(dir) = target.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "failed to sync store directory");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}
