//! Manifest persistence.
//!
//! The store is the only writer of manifest files. Every save recomputes the
//! derived counters and replaces the file atomically (temp file + rename in
//! the same directory), so a crash mid-write leaves the previous manifest
//! intact. Lookups check the current run first and fall back to an index of
//! every run under the artifact root, rebuilt on demand.

mod index;
mod manifest_store;

pub use index::ManifestIndex;
pub use manifest_store::{ManifestStore, SharedManifest};
