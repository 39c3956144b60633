//! Payload offload to a blob store
//!
//! Platform fields have size limits. Values over the configured threshold are
//! written to a [`BlobStore`] and replaced by a reference marker; reading goes
//! the other way. [`PayloadStore`] does both and passes small values through.

mod blob;
mod memory;
mod payload;

pub use blob::{BlobStore, StorageError};
pub use memory::InMemoryBlobStore;
pub use payload::{PayloadStore, DEFAULT_PAYLOAD_THRESHOLD, REFERENCE_MARKER};
