//! Adapter layer: concrete providers and certificate store backends.
//!
//! - `backend`: the `KeyBackend` and `StoreBackend` traits services consume
//! - `soft`: software GOST provider (memory or directory containers)
//! - `stores`: directory-backed and in-memory system stores

pub mod backend;
pub mod soft;
pub mod stores;

pub use backend::{KeyBackend, KeyInfo, StoreBackend, StoredBinding, StoredCert};
pub use soft::SoftProvider;
pub use stores::{DirectoryStores, MemoryStores};
