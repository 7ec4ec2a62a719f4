//! Preferences synchronization engine.
//!
//! [`PrefEngine`] binds an application's default preferences to a durable
//! store and keeps three views consistent: the defaults, the in-memory
//! effective preferences, and the file on disk.
//!
//! - On initialization, defaults are merged into whatever the store already
//!   holds without overriding it, and the result is written back.
//! - Updates are write-through: they reach the disk before returning, and a
//!   failed write leaves memory unchanged.
//! - [`PrefEngine::reload`] picks up edits made by hand or by another
//!   process, restoring any default keys the edit removed.
//!
//! ```no_run
//! use prefsync_engine::{PrefEngine, StoreSource};
//! use serde_json::json;
//!
//! # fn main() -> prefsync_engine::EngineResult<()> {
//! let defaults = json!({"theme": "light", "font_size": 12})
//!     .as_object()
//!     .cloned()
//!     .unwrap_or_default();
//! let prefs = PrefEngine::initialize(StoreSource::app("roadrunner"), defaults)?;
//! prefs.update("theme", "dark")?;
//! assert_eq!(prefs.get("theme")?, json!("dark"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod source;
pub mod validate;

pub use config::EngineConfig;
pub use engine::{PrefEngine, ReloadReport};
pub use error::{EngineError, EngineResult};
pub use source::StoreSource;
pub use validate::{KindsMatchDefaults, PreferenceValidator};

// Re-export key types
pub use prefsync_merge::{MapChange, MapDiff};
pub use prefsync_store::{
    Durability, FileStore, FormatError, InMemoryStore, LocationError, PreferenceStore, StoreError,
};
pub use prefsync_types::{KeyPath, PrefMap, PrefValue, StoreHandle};
