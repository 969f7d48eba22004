// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Versioned configuration storage.
//!
//! [`VersionStore`] serializes writers per entry scope and drives a
//! [`DurableStore`] backend ([`SqliteStore`] or [`InMemoryStore`]). Versions
//! are append-only; rollback and delete are new versions. Tenant KEK records
//! persist through a [`TenantKeyStore`] on the same backends.

pub mod durable;
pub mod error;
pub mod keys;
pub mod listener;
pub mod memory;
pub mod pool;
pub mod sqlite;
pub mod store;

pub use durable::{AppendRequest, DurableStore};
pub use error::{Result, StoreError};
pub use keys::{InMemoryKeyStore, TenantKeyStore};
pub use listener::{CommitEvent, CommitListener};
pub use memory::InMemoryStore;
pub use pool::{create_memory_pool, create_pool};
pub use sqlite::SqliteStore;
pub use store::VersionStore;
