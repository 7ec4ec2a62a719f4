//! Foundation types for prefsync.
//!
//! Every other prefsync crate depends on `prefsync-types`.
//!
//! # Key Types
//!
//! - [`PrefValue`]: a single preference value (string, number, bool, null,
//!   sequence or nested mapping)
//! - [`PrefMap`]: a mapping of preference keys to values
//! - [`StoreHandle`]: the resolved durable location of a preferences store
//! - [`KeyPath`]: dotted path for hierarchical access into nested mappings

pub mod error;
pub mod handle;
pub mod path;
pub mod value;

pub use error::TypeError;
pub use handle::StoreHandle;
pub use path::KeyPath;
pub use value::{to_pref_map, value_kind, PrefMap, PrefValue};
