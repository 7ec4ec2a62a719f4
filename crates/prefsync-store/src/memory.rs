//! In-memory preference store for tests and embedding.
//!
//! [`InMemoryStore`] keeps the *encoded* document rather than a mapping, so
//! reads go through the same decode path as a file and malformed content can
//! be injected with [`InMemoryStore::set_raw`].

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use prefsync_types::{PrefMap, StoreHandle};

use crate::codec::{JsonCodec, PrefCodec};
use crate::error::{StoreError, StoreResult};
use crate::traits::PreferenceStore;

/// Handle reported by in-memory stores unless another one is given.
const MEMORY_HANDLE: &str = "<memory>";

/// An implementation of [`PreferenceStore`] holding one encoded document.
///
/// Data is lost when the store is dropped.
#[derive(Debug)]
pub struct InMemoryStore {
    handle: StoreHandle,
    codec: JsonCodec,
    document: RwLock<Option<Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryStore {
    /// Create an empty store (as if the file did not exist yet).
    pub fn new() -> Self {
        Self::with_handle(StoreHandle::new(MEMORY_HANDLE))
    }

    pub fn with_handle(handle: StoreHandle) -> Self {
        Self {
            handle,
            codec: JsonCodec::default(),
            document: RwLock::new(None),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Replace the stored document with raw bytes, bypassing the codec.
    pub fn set_raw(&self, bytes: impl Into<Vec<u8>>) {
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = Some(bytes.into());
    }

    /// The stored document, if any.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget the stored document.
    pub fn clear(&self) {
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceStore for InMemoryStore {
    fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    fn read(&self) -> StoreResult<PrefMap> {
        let Some(bytes) = self.raw() else {
            return Ok(PrefMap::new());
        };
        self.codec.decode(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.handle.path().to_path_buf(),
            source,
        })
    }

    fn write(&self, map: &PrefMap) -> StoreResult<()> {
        let bytes = self.codec.encode(map).map_err(|source| StoreError::Encode {
            path: self.handle.path().to_path_buf(),
            source,
        })?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: self.handle.path().to_path_buf(),
                source: io::Error::other("simulated write failure"),
            });
        }
        self.set_raw(bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self) -> StoreResult<bool> {
        Ok(self
            .document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some())
    }
}
