//! # quillpost-storage
//!
//! Storage abstraction layer for the Quillpost server.
//!
//! This crate defines the traits that every storage backend implements. It
//! does not contain any implementations; those live in
//! `quillpost-db-memory` and `quillpost-db-postgres`.
//!
//! ## Overview
//!
//! - [`AccountStorage`] holds accounts and their hashed secrets.
//! - [`PostStorage`] holds posts. Every read and write is scoped by owner,
//!   so a post belonging to someone else is indistinguishable from a post
//!   that does not exist.
//!
//! Backends must make every write atomic: a failed write leaves no partial
//! state behind.
//!
//! ## Example
//!
//! ```ignore
//! use quillpost_storage::{PostStorage, StorageError};
//!
//! async fn titles(storage: &dyn PostStorage, owner: AccountId) -> Result<Vec<String>, StorageError> {
//!     let page = storage.list_owned(owner, PageRequest::default()).await?;
//!     Ok(page.items.into_iter().map(|p| p.title).collect())
//! }
//! ```

mod error;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use traits::{AccountStorage, PostStorage};

/// Type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
