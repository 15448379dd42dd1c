//! # quillpost-core
//!
//! Domain types shared by every Quillpost crate: strongly typed identifiers,
//! the `Account` and `Post` models, pagination, and field-level validation
//! errors.

pub mod error;
pub mod id;
pub mod model;
pub mod page;
pub mod validation;

pub use error::{CoreError, Result};
pub use id::{AccountId, PostId};
pub use model::{Account, NewAccount, NewPost, Post};
pub use page::{Page, PageRequest};
pub use validation::{FieldError, ValidationErrors};
