//! In-process storage backend.
//!
//! Backed by `object_store::memory::InMemory`, which supports multipart
//! sessions. Used for dry runs, benchmarks and tests.

use object_store::memory::InMemory;

use super::{BackendConfig, StorageProvider};

impl StorageProvider {
    /// Create a provider over a fresh, empty in-memory store.
    pub fn in_memory() -> Self {
        Self::from_multipart_store(BackendConfig::Memory, InMemory::new())
    }
}
