//! Durable preference storage for prefsync.
//!
//! This crate owns everything between an in-memory [`PrefMap`] and the file
//! a user can open in a text editor.
//!
//! # Components
//!
//! - [`StoreLocator`] -- resolves where an application's preferences live
//! - [`PrefCodec`] / [`JsonCodec`] -- structured text encoding of a mapping
//! - [`PreferenceStore`] -- read/write/exists over one [`StoreHandle`]
//! - [`FileStore`] -- atomic file-backed store (temp file + rename)
//! - [`InMemoryStore`] -- byte-buffer store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A missing store reads as an empty mapping; a malformed one is an error.
//! 2. Writes are atomic: readers see the old file or the new one, never a mix.
//! 3. A failed write leaves the previous content byte-identical.
//! 4. No locking across stores: concurrent writers are last-writer-wins.
//! 5. All I/O errors are propagated, never silently ignored.
//!
//! [`PrefMap`]: prefsync_types::PrefMap
//! [`StoreHandle`]: prefsync_types::StoreHandle

pub mod codec;
pub mod error;
pub mod file;
pub mod locator;
pub mod memory;
pub mod traits;

pub use codec::{JsonCodec, PrefCodec};
pub use error::{FormatError, LocationError, StoreError, StoreResult};
pub use file::{Durability, FileStore, StagedWrite};
pub use locator::{sanitize_app_name, StoreLocator, DEFAULT_BASE_DIR_ENV, DEFAULT_FILE_NAME};
pub use memory::InMemoryStore;
pub use traits::PreferenceStore;
