//! Merge engine for prefsync.
//!
//! - [`merge_defaults`] computes the effective preferences from a stored
//!   mapping and the application's default set. Defaults only ever add keys;
//!   a key the store defines is never altered, and keys unknown to the
//!   defaults are kept.
//! - [`diff_maps`] compares two mappings key by key, used to report what a
//!   reload changed.

pub mod defaults;
pub mod diff;

pub use defaults::{merge_defaults, MergeOutcome};
pub use diff::{diff_maps, MapChange, MapDiff};
