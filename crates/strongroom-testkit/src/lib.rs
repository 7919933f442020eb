//! # Strongroom Testkit
//!
//! Testing utilities for Strongroom.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: subjects with credential blobs, and helpers that seed a
//!   store with an organization directly
//! - **FlakyStore**: a store wrapper that forces link-swap conflicts and
//!   can interleave concurrent operations, for exercising retry paths
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use strongroom_testkit::fixtures::{seed_organization, TestSubject};
//! use strongroom_store::{MemoryStore, Store};
//!
//! async fn example() {
//!     let store = MemoryStore::new();
//!     let alice = TestSubject::new("alice");
//!     seed_organization(&store, "Acme", "Founders", &alice).await;
//!     assert!(store.get_link("Acme", "alice").await.unwrap().is_some());
//! }
//! ```

pub mod fixtures;
pub mod flaky;
pub mod generators;

pub use fixtures::{register_member, seed_organization, set_link_active, TestSubject};
pub use flaky::FlakyStore;
