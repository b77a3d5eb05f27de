//! File catalog
//!
//! Shared, snapshot-based listing of the files in the shared directory.

pub mod entry;
pub mod store;

pub use entry::FileEntry;
pub use store::{CatalogSnapshot, FileCatalog, PARTIAL_PREFIX};
