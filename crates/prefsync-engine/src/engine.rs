use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use prefsync_merge::{diff_maps, merge_defaults, MapDiff};
use prefsync_store::PreferenceStore;
use prefsync_types::{to_pref_map, KeyPath, PrefMap, PrefValue, StoreHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::source::StoreSource;
use crate::validate::PreferenceValidator;

/// What a [`PrefEngine::reload`] changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReloadReport {
    /// Default keys that were missing from the store and have been restored
    /// (and written back).
    pub restored: Vec<KeyPath>,
    /// Top-level changes between the previous and the reloaded preferences.
    pub diff: MapDiff,
}

impl ReloadReport {
    pub fn is_unchanged(&self) -> bool {
        self.restored.is_empty() && self.diff.is_empty()
    }
}

/// Preferences bound to one durable store.
///
/// An engine exists only in the READY or CLOSED state: constructors either
/// return a ready engine or fail, and [`close`](Self::close) moves it to
/// CLOSED, after which every operation fails with [`EngineError::Closed`].
///
/// # Consistency
///
/// - Reads are served from memory and reflect the last successful
///   initialization, update or reload.
/// - Mutations are write-through. Each one builds a candidate mapping,
///   validates it, persists it and only then replaces the in-memory
///   preferences, so a failure leaves memory and disk as they were.
/// - One mutex guards the preferences for the whole read-modify-write
///   sequence; threads sharing an engine never interleave mutations.
///
/// # Sharing a store
///
/// Engines do not coordinate with each other. Two engines (in one process or
/// several) bound to the same file are last-writer-wins at whole-file
/// granularity: a write from one replaces everything the other wrote,
/// including keys it never knew about. Writes are atomic, so the file is
/// never torn, but updates can be lost. Use a single engine per store, or
/// serialize access externally, when that matters; call
/// [`reload`](Self::reload) to pick up another writer's changes.
pub struct PrefEngine {
    store: Box<dyn PreferenceStore>,
    defaults: PrefMap,
    validator: Option<Box<dyn PreferenceValidator>>,
    /// `None` once closed.
    prefs: Mutex<Option<PrefMap>>,
}

impl PrefEngine {
    /// Open the store for `source` with the default configuration and merge
    /// `defaults` into it.
    pub fn initialize(source: impl Into<StoreSource>, defaults: PrefMap) -> EngineResult<Self> {
        Self::initialize_with_config(source, defaults, &EngineConfig::default())
    }

    pub fn initialize_with_config(
        source: impl Into<StoreSource>,
        defaults: PrefMap,
        config: &EngineConfig,
    ) -> EngineResult<Self> {
        let store = config
            .open_store(&source.into())
            .map_err(EngineError::initialization)?;
        Self::from_store(store, defaults)
    }

    /// Bind an already constructed store.
    ///
    /// Reads the store, adds every missing default, and writes the result
    /// back if anything was added or the store did not exist yet.
    pub fn from_store(store: impl PreferenceStore + 'static, defaults: PrefMap) -> EngineResult<Self> {
        let prefs = load(&store, &defaults).map_err(EngineError::initialization)?;
        info!(store = %store.handle(), keys = prefs.len(), "preferences ready");
        Ok(Self {
            store: Box::new(store),
            defaults,
            validator: None,
            prefs: Mutex::new(Some(prefs)),
        })
    }

    /// Initialize with defaults taken from `T::default()`.
    ///
    /// The merged preferences must deserialize into `T`; a store holding
    /// values of the wrong shape fails initialization.
    pub fn initialize_typed<T>(source: impl Into<StoreSource>) -> EngineResult<Self>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        Self::initialize_typed_with_config::<T>(source, &EngineConfig::default())
    }

    pub fn initialize_typed_with_config<T>(
        source: impl Into<StoreSource>,
        config: &EngineConfig,
    ) -> EngineResult<Self>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let defaults = to_pref_map(&T::default())
            .map_err(|e| EngineError::initialization(EngineError::InvalidDefaults(e)))?;
        let engine = Self::initialize_with_config(source, defaults, config)?;
        engine.typed::<T>().map_err(EngineError::initialization)?;
        Ok(engine)
    }

    /// Run `validator` before every subsequent mutation.
    pub fn with_validator(mut self, validator: impl PreferenceValidator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    // ---- Reads ----

    /// The value stored under `key`.
    pub fn get(&self, key: &str) -> EngineResult<PrefValue> {
        self.read(|prefs| {
            prefs.get(key).cloned().ok_or_else(|| EngineError::KeyNotFound {
                key: key.to_string(),
            })
        })
    }

    /// The value stored under `key`, or `fallback` if there is none.
    pub fn get_or(&self, key: &str, fallback: impl Into<PrefValue>) -> EngineResult<PrefValue> {
        self.read(|prefs| Ok(prefs.get(key).cloned().unwrap_or_else(|| fallback.into())))
    }

    /// The value under `key`, deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> EngineResult<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|source| EngineError::Type {
            target: key.to_string(),
            source,
        })
    }

    /// The value at a nested path.
    pub fn get_path(&self, path: &KeyPath) -> EngineResult<PrefValue> {
        self.read(|prefs| {
            path.get(prefs).cloned().ok_or_else(|| EngineError::KeyNotFound {
                key: path.to_string(),
            })
        })
    }

    pub fn contains(&self, key: &str) -> EngineResult<bool> {
        self.read(|prefs| Ok(prefs.contains_key(key)))
    }

    /// Top-level keys, sorted.
    pub fn keys(&self) -> EngineResult<Vec<String>> {
        self.read(|prefs| Ok(prefs.keys().cloned().collect()))
    }

    /// A snapshot of the effective preferences.
    pub fn as_mapping(&self) -> EngineResult<PrefMap> {
        self.read(|prefs| Ok(prefs.clone()))
    }

    /// A snapshot of the effective preferences as `T`.
    pub fn typed<T: DeserializeOwned>(&self) -> EngineResult<T> {
        let snapshot = self.as_mapping()?;
        serde_json::from_value(Value::Object(snapshot)).map_err(|source| EngineError::Type {
            target: "preferences".to_string(),
            source,
        })
    }

    // ---- Mutations ----

    /// Set `key` to `value`, returning the previous value.
    pub fn update(&self, key: &str, value: impl Into<PrefValue>) -> EngineResult<Option<PrefValue>> {
        let value = value.into();
        self.mutate("update", |prefs| Ok(prefs.insert(key.to_string(), value)))
    }

    /// Set several keys at once, persisted in a single write.
    pub fn update_many(&self, values: PrefMap) -> EngineResult<()> {
        if values.is_empty() {
            return self.read(|_| Ok(()));
        }
        self.mutate("update_many", |prefs| {
            prefs.extend(values);
            Ok(())
        })
    }

    /// Set the value at a nested path, creating intermediate mappings.
    pub fn update_path(
        &self,
        path: &KeyPath,
        value: impl Into<PrefValue>,
    ) -> EngineResult<Option<PrefValue>> {
        let value = value.into();
        self.mutate("update_path", |prefs| Ok(path.insert(prefs, value)?))
    }

    /// Replace all preferences with `values`.
    ///
    /// Defaults missing from `values` are added back, so every default key
    /// stays present.
    pub fn replace_all(&self, values: PrefMap) -> EngineResult<()> {
        let merged = merge_defaults(&values, &self.defaults).effective;
        self.mutate("replace_all", |prefs| {
            *prefs = merged;
            Ok(())
        })
    }

    /// Delete `key`, returning its value.
    ///
    /// A key that has a default stays deleted until the next reload or
    /// initialization restores it.
    pub fn remove(&self, key: &str) -> EngineResult<PrefValue> {
        self.mutate("remove", |prefs| {
            prefs.remove(key).ok_or_else(|| EngineError::KeyNotFound {
                key: key.to_string(),
            })
        })
    }

    /// Delete the value at a nested path.
    pub fn remove_path(&self, path: &KeyPath) -> EngineResult<PrefValue> {
        self.mutate("remove_path", |prefs| {
            path.remove(prefs).ok_or_else(|| EngineError::KeyNotFound {
                key: path.to_string(),
            })
        })
    }

    /// Re-read the store and replace the in-memory preferences.
    ///
    /// Defaults removed from the store are restored (and written back); keys
    /// added to it are kept. If the store cannot be read or decoded the error
    /// is returned and the current preferences stay in effect.
    pub fn reload(&self) -> EngineResult<ReloadReport> {
        let mut guard = self.lock();
        let prefs = guard.as_mut().ok_or(EngineError::Closed)?;

        let stored = self.store.read().map_err(|e| {
            warn!(store = %self.store.handle(), error = %e, "reload failed; keeping current preferences");
            e
        })?;
        let outcome = merge_defaults(&stored, &self.defaults);
        if outcome.changed() {
            self.store.write(&outcome.effective)?;
            info!(
                store = %self.store.handle(),
                restored = outcome.added.len(),
                "restored missing defaults on reload"
            );
        }

        let diff = diff_maps(prefs, &outcome.effective);
        *prefs = outcome.effective;
        debug!(store = %self.store.handle(), changes = diff.len(), "preferences reloaded");
        Ok(ReloadReport {
            restored: outcome.added,
            diff,
        })
    }

    /// Release the in-memory preferences. The store file is left as is.
    pub fn close(&self) -> EngineResult<()> {
        self.lock().take().ok_or(EngineError::Closed)?;
        debug!(store = %self.store.handle(), "preferences closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    // ---- Accessors ----

    pub fn handle(&self) -> &StoreHandle {
        self.store.handle()
    }

    /// The default set this engine was initialized with.
    pub fn defaults(&self) -> &PrefMap {
        &self.defaults
    }

    // ---- Internals ----

    /// The cached mapping is only ever replaced wholesale after a successful
    /// write, so a panic while the lock is held cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, Option<PrefMap>> {
        self.prefs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&PrefMap) -> EngineResult<R>) -> EngineResult<R> {
        let guard = self.lock();
        let prefs = guard.as_ref().ok_or(EngineError::Closed)?;
        f(prefs)
    }

    /// Apply `f` to a copy of the preferences, validate, persist, then
    /// commit the copy. Any error leaves memory and disk untouched.
    fn mutate<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut PrefMap) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut guard = self.lock();
        let prefs = guard.as_mut().ok_or(EngineError::Closed)?;

        let mut candidate = prefs.clone();
        let result = f(&mut candidate)?;

        if let Some(validator) = &self.validator {
            validator.check(&candidate).map_err(|reason| {
                warn!(op, %reason, "preferences change rejected");
                EngineError::Rejected { reason }
            })?;
        }

        self.store.write(&candidate).map_err(|e| {
            warn!(op, store = %self.store.handle(), error = %e, "write failed; change discarded");
            e
        })?;
        *prefs = candidate;
        debug!(op, store = %self.store.handle(), "preferences persisted");
        Ok(result)
    }
}

impl fmt::Debug for PrefEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefEngine")
            .field("store", self.store.handle())
            .field("defaults", &self.defaults.len())
            .field("validator", &self.validator.is_some())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read the store, merge the defaults, and write back when needed.
fn load(store: &dyn PreferenceStore, defaults: &PrefMap) -> EngineResult<PrefMap> {
    let existed = store.exists()?;
    let stored = store.read()?;
    let outcome = merge_defaults(&stored, defaults);
    if outcome.changed() || !existed {
        store.write(&outcome.effective)?;
        if existed {
            info!(store = %store.handle(), added = outcome.added.len(), "added new defaults to store");
        } else {
            info!(store = %store.handle(), "created preferences store");
        }
    }
    Ok(outcome.effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use prefsync_store::{FileStore, FormatError, InMemoryStore, StoreError, StoreResult};
    use serde::Deserialize;
    use serde_json::json;

    use crate::validate::KindsMatchDefaults;

    fn map(value: Value) -> PrefMap {
        value.as_object().cloned().unwrap()
    }

    fn defaults() -> PrefMap {
        map(json!({"theme": "light", "font_size": 12, "y": "default-y"}))
    }

    fn config(base: &Path) -> EngineConfig {
        EngineConfig::default().with_base_dir(base)
    }

    fn engine_in(base: &Path) -> PrefEngine {
        PrefEngine::initialize_with_config("testapp", defaults(), &config(base)).unwrap()
    }

    fn on_disk(engine: &PrefEngine) -> PrefMap {
        let text = fs::read_to_string(engine.handle().path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    /// File store whose writes can be made to fail after the temp file has
    /// been written but before it replaces the target.
    struct FlakyStore {
        inner: FileStore,
        fail: AtomicBool,
    }

    impl FlakyStore {
        fn new(path: &Path) -> Self {
            Self {
                inner: FileStore::new(StoreHandle::new(path)),
                fail: AtomicBool::new(false),
            }
        }
    }

    impl PreferenceStore for FlakyStore {
        fn handle(&self) -> &StoreHandle {
            self.inner.handle()
        }

        fn read(&self) -> StoreResult<PrefMap> {
            self.inner.read()
        }

        fn write(&self, map: &PrefMap) -> StoreResult<()> {
            let staged = self.inner.stage(map)?;
            if self.fail.load(Ordering::SeqCst) {
                drop(staged);
                return Err(StoreError::Write {
                    path: self.inner.handle().path().to_path_buf(),
                    source: io::Error::other("no space left on device"),
                });
            }
            staged.commit()
        }

        fn exists(&self) -> StoreResult<bool> {
            self.inner.exists()
        }
    }

    // ---- Initialization ----

    #[test]
    fn first_run_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        assert_eq!(
            engine.handle().path(),
            dir.path().join("testapp").join("preferences.json").as_path()
        );
        assert_eq!(engine.as_mapping().unwrap(), defaults());
        assert_eq!(on_disk(&engine), defaults());
    }

    #[test]
    fn defaults_do_not_override_stored_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, r#"{"a": 1}"#).unwrap();

        let engine = PrefEngine::initialize(path.as_path(), map(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(engine.as_mapping().unwrap(), map(json!({"a": 1, "b": 3})));
        assert_eq!(engine.get("a").unwrap(), json!(1));

        let disk: PrefMap = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(disk, map(json!({"a": 1, "b": 3})));
    }

    #[test]
    fn unchanged_store_is_not_rewritten() {
        let store = Arc::new(InMemoryStore::new());
        store.set_raw(r#"{"theme": "dark", "font_size": 10, "y": "v"}"#);
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn empty_defaults_still_create_store() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), PrefMap::new()).unwrap();
        assert!(engine.keys().unwrap().is_empty());
        assert!(store.exists().unwrap());
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn reopening_sees_previous_updates() {
        let dir = tempfile::tempdir().unwrap();
        let first = engine_in(dir.path());
        first.update("theme", "dark").unwrap();
        first.close().unwrap();

        let second = engine_in(dir.path());
        assert_eq!(second.get("theme").unwrap(), json!("dark"));
        assert_eq!(second.get("font_size").unwrap(), json!(12));
    }

    #[test]
    fn corrupt_store_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();

        let err = PrefEngine::initialize(path.as_path(), defaults()).unwrap_err();
        assert!(matches!(err, EngineError::Initialization(_)));
        assert!(matches!(err.format_error(), Some(FormatError::Syntax { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn invalid_location_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let err = PrefEngine::initialize_with_config("", defaults(), &config(dir.path())).unwrap_err();
        assert!(matches!(
            err.store_error(),
            Some(StoreError::Location(prefsync_store::LocationError::InvalidAppName { .. }))
        ));
    }

    // ---- Reads ----

    #[test]
    fn missing_key() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        let err = engine.get("nonexistent").unwrap_err();
        assert!(matches!(err, EngineError::KeyNotFound { ref key } if key == "nonexistent"));
        assert_eq!(engine.get_or("nonexistent", 42).unwrap(), json!(42));
        assert_eq!(engine.get_or("theme", 42).unwrap(), json!("light"));
        assert!(!engine.contains("nonexistent").unwrap());
    }

    #[test]
    fn typed_value_access() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        let size: u32 = engine.get_as("font_size").unwrap();
        assert_eq!(size, 12);
        let err = engine.get_as::<bool>("theme").unwrap_err();
        assert!(matches!(err, EngineError::Type { ref target, .. } if target == "theme"));
    }

    #[test]
    fn keys_are_sorted() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        assert_eq!(engine.keys().unwrap(), ["font_size", "theme", "y"]);
    }

    #[test]
    fn snapshot_is_detached() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        let mut snapshot = engine.as_mapping().unwrap();
        snapshot.insert("theme".into(), json!("neon"));
        assert_eq!(engine.get("theme").unwrap(), json!("light"));
    }

    // ---- Mutations ----

    #[test]
    fn update_is_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        let prev = engine.update("x", 5).unwrap();
        assert!(prev.is_none());
        assert_eq!(engine.get("x").unwrap(), json!(5));
        assert_eq!(on_disk(&engine)["x"], json!(5));

        let prev = engine.update("x", 6).unwrap();
        assert_eq!(prev, Some(json!(5)));
        assert_eq!(on_disk(&engine)["x"], json!(6));
    }

    #[test]
    fn keys_are_literal() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), PrefMap::new()).unwrap();
        engine.update("preference 1", 1).unwrap();
        engine.update("a.b", true).unwrap();
        assert_eq!(engine.get("a.b").unwrap(), json!(true));
        assert!(engine.get_path(&KeyPath::parse("a.b").unwrap()).is_err());
        assert_eq!(engine.get("preference 1").unwrap(), json!(1));
    }

    #[test]
    fn update_many_single_write() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        let writes = store.write_count();

        engine
            .update_many(map(json!({"theme": "dark", "recent": ["a.txt"], "font_size": 14})))
            .unwrap();
        assert_eq!(store.write_count(), writes + 1);
        assert_eq!(engine.get("recent").unwrap(), json!(["a.txt"]));
        assert_eq!(store.read().unwrap()["font_size"], json!(14));

        engine.update_many(PrefMap::new()).unwrap();
        assert_eq!(store.write_count(), writes + 1);
    }

    #[test]
    fn nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        let width = KeyPath::parse("window.size.width").unwrap();

        engine.update_path(&width, 1024).unwrap();
        assert_eq!(engine.get_path(&width).unwrap(), json!(1024));
        assert_eq!(on_disk(&engine)["window"], json!({"size": {"width": 1024}}));

        let err = engine
            .update_path(&KeyPath::parse("theme.accent").unwrap(), "blue")
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPath(_)));

        assert_eq!(engine.remove_path(&width).unwrap(), json!(1024));
        assert!(engine.get_path(&width).unwrap_err().is_not_found());
        assert!(engine.remove_path(&width).unwrap_err().is_not_found());
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.update("extra", "x").unwrap();

        assert_eq!(engine.remove("extra").unwrap(), json!("x"));
        assert!(!on_disk(&engine).contains_key("extra"));
        assert!(engine.remove("extra").unwrap_err().is_not_found());

        assert_eq!(engine.remove("theme").unwrap(), json!("light"));
        assert!(engine.get("theme").unwrap_err().is_not_found());
        engine.reload().unwrap();
        assert_eq!(engine.get("theme").unwrap(), json!("light"));
    }

    #[test]
    fn replace_all_keeps_defaults_present() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.update("old", 1).unwrap();

        engine.replace_all(map(json!({"theme": "dark", "new": true}))).unwrap();
        let expected = map(json!({"theme": "dark", "new": true, "font_size": 12, "y": "default-y"}));
        assert_eq!(engine.as_mapping().unwrap(), expected);
        assert_eq!(on_disk(&engine), expected);
        assert_eq!(engine.defaults(), &defaults());
    }

    #[test]
    fn failed_write_rolls_back() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        let before = store.raw();

        store.fail_writes(true);
        let err = engine.update("theme", "dark").unwrap_err();
        assert!(err.store_error().is_some_and(StoreError::is_write_error));
        assert_eq!(engine.get("theme").unwrap(), json!("light"));
        assert!(engine.remove("font_size").is_err());
        assert_eq!(engine.get("font_size").unwrap(), json!(12));
        assert!(engine.update_many(map(json!({"z": 1}))).is_err());
        assert!(!engine.contains("z").unwrap());
        assert_eq!(store.raw(), before);

        store.fail_writes(false);
        engine.update("theme", "dark").unwrap();
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));
    }

    #[test]
    fn interrupted_file_write_leaves_file_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = Arc::new(FlakyStore::new(&path));
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        engine.update("theme", "dark").unwrap();
        let before = fs::read(&path).unwrap();

        store.fail.store(true, Ordering::SeqCst);
        let err = engine.update("theme", "solarized").unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Write { .. })));

        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "temp file left behind");
    }

    #[test]
    fn validator_rejects_without_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults())
            .unwrap()
            .with_validator(KindsMatchDefaults::new(defaults()));
        let writes = store.write_count();

        let err = engine.update("font_size", "huge").unwrap_err();
        assert!(matches!(err, EngineError::Rejected { ref reason } if reason.contains("font_size")));
        assert_eq!(engine.get("font_size").unwrap(), json!(12));
        assert_eq!(store.write_count(), writes);

        engine.update("font_size", 16).unwrap();
        assert_eq!(store.write_count(), writes + 1);
    }

    #[test]
    fn closure_validator() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults())
            .unwrap()
            .with_validator(|m: &PrefMap| {
                if m.len() > 4 {
                    Err(format!("at most 4 preferences, got {}", m.len()))
                } else {
                    Ok(())
                }
            });
        engine.update("one", 1).unwrap();
        assert!(matches!(engine.update("two", 2), Err(EngineError::Rejected { .. })));
        assert!(!engine.contains("two").unwrap());
    }

    // ---- Reload ----

    #[test]
    fn reload_restores_defaults_and_keeps_extras() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());

        let mut edited = on_disk(&engine);
        edited.remove("y");
        edited.insert("z".into(), json!("external"));
        fs::write(engine.handle().path(), serde_json::to_string(&edited).unwrap()).unwrap();

        let report = engine.reload().unwrap();
        assert_eq!(engine.get("y").unwrap(), json!("default-y"));
        assert_eq!(engine.get("z").unwrap(), json!("external"));
        assert_eq!(report.restored, [KeyPath::key("y")]);
        assert_eq!(report.diff.keys().collect::<Vec<_>>(), ["z"]);
        assert_eq!(on_disk(&engine)["y"], json!("default-y"));
    }

    #[test]
    fn reload_picks_up_changed_values() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        assert!(engine.reload().unwrap().is_unchanged());

        store.set_raw(r#"{"theme": "dark", "font_size": 12, "y": "default-y"}"#);
        let report = engine.reload().unwrap();
        assert!(report.restored.is_empty());
        assert_eq!(report.diff.modifications(), 1);
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));
    }

    #[test]
    fn reload_of_corrupt_store_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.update("theme", "dark").unwrap();
        fs::write(engine.handle().path(), "{\"theme\": ").unwrap();

        let err = engine.reload().unwrap_err();
        assert!(err.format_error().is_some());
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));

        fs::write(engine.handle().path(), "{\"theme\": \"blue\"}").unwrap();
        engine.reload().unwrap();
        assert_eq!(engine.get("theme").unwrap(), json!("blue"));
        assert_eq!(engine.get("font_size").unwrap(), json!(12));
    }

    #[test]
    fn reload_write_back_failure_keeps_cache() {
        let store = Arc::new(InMemoryStore::new());
        let engine = PrefEngine::from_store(Arc::clone(&store), defaults()).unwrap();
        engine.update("k", 2).unwrap();
        let before = engine.as_mapping().unwrap();

        store.set_raw(r#"{"theme": "dark"}"#);
        store.fail_writes(true);
        let err = engine.reload().unwrap_err();
        assert!(err.store_error().is_some_and(StoreError::is_write_error));
        assert_eq!(engine.as_mapping().unwrap(), before);
        assert_eq!(store.raw(), Some(br#"{"theme": "dark"}"#.to_vec()));

        store.fail_writes(false);
        engine.reload().unwrap();
        assert_eq!(engine.get("theme").unwrap(), json!("dark"));
        assert!(!engine.contains("k").unwrap());
    }

    #[test]
    fn reload_after_store_deleted_recreates_it() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.update("extra", 1).unwrap();
        fs::remove_file(engine.handle().path()).unwrap();

        let report = engine.reload().unwrap();
        assert_eq!(report.restored.len(), 3);
        assert_eq!(report.diff.removals(), 1);
        assert_eq!(on_disk(&engine), defaults());
    }

    // ---- Close ----

    #[test]
    fn closed_engine_rejects_everything() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());

        let path = KeyPath::parse("a.b").unwrap();
        assert!(engine.get("theme").unwrap_err().is_closed());
        assert!(engine.get_or("theme", 1).unwrap_err().is_closed());
        assert!(engine.get_path(&path).unwrap_err().is_closed());
        assert!(engine.contains("theme").unwrap_err().is_closed());
        assert!(engine.keys().unwrap_err().is_closed());
        assert!(engine.as_mapping().unwrap_err().is_closed());
        assert!(engine.update("theme", "dark").unwrap_err().is_closed());
        assert!(engine.update_many(PrefMap::new()).unwrap_err().is_closed());
        assert!(engine.update_path(&path, 1).unwrap_err().is_closed());
        assert!(engine.replace_all(PrefMap::new()).unwrap_err().is_closed());
        assert!(engine.remove("theme").unwrap_err().is_closed());
        assert!(engine.remove_path(&path).unwrap_err().is_closed());
        assert!(engine.reload().unwrap_err().is_closed());
        assert!(engine.close().unwrap_err().is_closed());
        assert!(engine.typed::<PrefMap>().unwrap_err().is_closed());
    }

    #[test]
    fn close_leaves_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_in(dir.path());
        engine.close().unwrap();
        assert!(engine.handle().path().exists());
    }

    // ---- Typed preferences ----

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct UiPrefs {
        theme: String,
        font_size: u32,
        window: WindowPrefs,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct WindowPrefs {
        width: u32,
        maximized: bool,
    }

    impl Default for UiPrefs {
        fn default() -> Self {
            Self {
                theme: "light".into(),
                font_size: 12,
                window: WindowPrefs::default(),
            }
        }
    }

    impl Default for WindowPrefs {
        fn default() -> Self {
            Self {
                width: 800,
                maximized: false,
            }
        }
    }

    #[test]
    fn typed_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui.json");
        fs::write(&path, r#"{"window": {"width": 1280}, "theme": "dark"}"#).unwrap();

        let engine = PrefEngine::initialize_typed::<UiPrefs>(path.as_path()).unwrap();
        let prefs: UiPrefs = engine.typed().unwrap();
        assert_eq!(prefs.theme, "dark");
        assert_eq!(prefs.font_size, 12);
        assert_eq!(prefs.window, WindowPrefs { width: 1280, maximized: false });
    }

    #[test]
    fn typed_initialization_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui.json");
        fs::write(&path, r#"{"font_size": "large"}"#).unwrap();

        let err = PrefEngine::initialize_typed::<UiPrefs>(path.as_path()).unwrap_err();
        match err {
            EngineError::Initialization(inner) => {
                assert!(matches!(*inner, EngineError::Type { .. }))
            }
            other => panic!("expected initialization error, got {other:?}"),
        }
    }

    #[test]
    fn typed_defaults_must_be_a_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let err = PrefEngine::initialize_typed::<u32>(dir.path().join("n.json").as_path())
            .unwrap_err();
        match err {
            EngineError::Initialization(inner) => assert!(matches!(
                *inner,
                EngineError::InvalidDefaults(prefsync_types::TypeError::ExpectedMapping {
                    found: "integer"
                })
            )),
            other => panic!("expected initialization error, got {other:?}"),
        }
        assert!(!dir.path().join("n.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_store_stays_linked() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.json");
        fs::write(&real, "{}").unwrap();
        let link = dir.path().join("link.json");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let engine = PrefEngine::initialize(link.as_path(), map(json!({"a": 1}))).unwrap();
        engine.update("b", 2).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        let disk: PrefMap = serde_json::from_str(&fs::read_to_string(&real).unwrap()).unwrap();
        assert_eq!(disk, map(json!({"a": 1, "b": 2})));
    }

    // ---- Sharing ----

    #[test]
    fn concurrent_updates_on_one_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine_in(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        engine.update(&format!("t{t}-k{i}"), i).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let disk = on_disk(&engine);
        assert_eq!(disk.len(), defaults().len() + 80);
        assert_eq!(disk, engine.as_mapping().unwrap());
    }

    #[test]
    fn two_engines_are_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = engine_in(dir.path());
        let b = engine_in(dir.path());

        a.update("from_a", 1).unwrap();
        b.update("from_b", 2).unwrap();

        // b never saw a's key, so its write dropped it.
        let disk = on_disk(&b);
        assert!(disk.contains_key("from_b"));
        assert!(!disk.contains_key("from_a"));

        let report = a.reload().unwrap();
        assert!(!a.contains("from_a").unwrap());
        assert_eq!(a.get("from_b").unwrap(), json!(2));
        assert_eq!(report.diff.len(), 2);
    }

    #[test]
    fn debug_output() {
        let engine = PrefEngine::from_store(InMemoryStore::new(), defaults()).unwrap();
        let text = format!("{engine:?}");
        assert!(text.contains("PrefEngine"));
        assert!(text.contains("closed: false"));
    }
}
