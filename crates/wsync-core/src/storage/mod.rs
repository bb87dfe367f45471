//! Storage layer
//!
//! Local files kept next to the sync engine.
//!
//! ## Architecture
//!
//! - **Snapshot**: the whole workspace tree as JSON, so unsent edits
//!   survive a restart
//! - **Template cache**: binary database templates as CBOR records, fetched
//!   once and reused
//!
//! Both write atomically (temp file, sync, rename).

pub mod cache;
pub mod error;
pub mod persistence;

pub use cache::{fetch_template, BlobCache, FileBlobCache, MemoryBlobCache};
pub use error::{StorageError, StorageResult};
pub use persistence::SnapshotFile;
