//! # Strongroom Store
//!
//! Persistence interface for the Strongroom repository, with an in-memory
//! implementation.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`MemoryStore`] - In-memory storage
//! - [`SubjectLink`] - A subject's membership in an organization, carrying
//!   the authoritative [`SessionRecord`]
//! - [`SwapResult`] - Outcome of a versioned link update
//!
//! ## Design Notes
//!
//! - **Unique inserts**: inserting an existing key returns `AlreadyExists`
//! - **Versioned links**: links change only through [`Store::swap_link`],
//!   or [`Store::swap_member_link`] when the change can shrink membership
//! - **Value swaps**: roles and documents are replaced only if unchanged
//!   since they were read

pub mod error;
pub mod memory;
pub mod records;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{
    Document, DocumentCipherMeta, Organization, SessionRecord, Subject, SubjectLink,
};
pub use traits::{InsertResult, ReplaceResult, Store, SwapResult};
