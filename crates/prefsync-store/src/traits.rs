use std::sync::Arc;

use prefsync_types::{PrefMap, StoreHandle};

use crate::error::StoreResult;

/// Durable storage for one preferences mapping.
///
/// All implementations must satisfy these invariants:
/// - A store that does not exist yet reads as an empty mapping.
/// - `write` is atomic: a concurrent `read` observes either the previous
///   mapping or the new one, never a partial document.
/// - A failed `write` leaves the previous content intact.
/// - Concurrent writers are last-writer-wins at whole-mapping granularity;
///   no merging of concurrent updates happens at this layer.
/// - All I/O errors are propagated, never silently ignored.
pub trait PreferenceStore: Send + Sync {
    /// The location this store is bound to.
    fn handle(&self) -> &StoreHandle;

    /// Read and decode the whole mapping.
    ///
    /// Returns an empty mapping if the store does not exist. Returns
    /// `StoreError::Corrupt` if it exists but cannot be decoded, and
    /// `StoreError::Read` if it cannot be opened.
    fn read(&self) -> StoreResult<PrefMap>;

    /// Encode and persist the whole mapping, replacing what was stored.
    fn write(&self, map: &PrefMap) -> StoreResult<()>;

    /// Check whether the store exists.
    fn exists(&self) -> StoreResult<bool>;
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for Box<S> {
    fn handle(&self) -> &StoreHandle {
        (**self).handle()
    }

    fn read(&self) -> StoreResult<PrefMap> {
        (**self).read()
    }

    fn write(&self, map: &PrefMap) -> StoreResult<()> {
        (**self).write(map)
    }

    fn exists(&self) -> StoreResult<bool> {
        (**self).exists()
    }
}

impl<S: PreferenceStore + ?Sized> PreferenceStore for Arc<S> {
    fn handle(&self) -> &StoreHandle {
        (**self).handle()
    }

    fn read(&self) -> StoreResult<PrefMap> {
        (**self).read()
    }

    fn write(&self, map: &PrefMap) -> StoreResult<()> {
        (**self).write(map)
    }

    fn exists(&self) -> StoreResult<bool> {
        (**self).exists()
    }
}
