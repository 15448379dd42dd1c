//! In-memory storage backend for the Quillpost server.
//!
//! This crate implements the `AccountStorage` and `PostStorage` traits from
//! `quillpost-storage` on top of ordered maps guarded by a single async
//! `RwLock`. Every write takes the write lock for its whole duration, so a
//! uniqueness check and the insert that follows it are atomic.
//!
//! Data lives only as long as the process. Use it for tests and local
//! development.
//!
//! # Example
//!
//! ```ignore
//! use quillpost_db_memory::InMemoryStorage;
//! use quillpost_storage::AccountStorage;
//!
//! let storage = InMemoryStorage::new();
//! let account = storage.create(NewAccount::new("a@x.com", hash)).await?;
//! ```

mod storage;

pub use quillpost_storage::{AccountStorage, PostStorage, StorageError};
pub use storage::InMemoryStorage;
