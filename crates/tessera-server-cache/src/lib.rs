// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Two-tier cache of resolved configuration values.
//!
//! The local tier is a bounded LRU with a short TTL. The shared tier is
//! consulted on a local miss and never holds decrypted secrets. Writes
//! invalidate both tiers before they are acknowledged and publish the
//! invalidation so other instances drop their local copies.

pub mod error;
pub mod layer;
pub mod local;
pub mod pattern;
pub mod shared;
pub mod transport;

pub use error::{CacheError, Result};
pub use layer::{CacheLayer, CacheStats};
pub use local::LocalTier;
pub use pattern::InvalidationPattern;
pub use shared::{InMemorySharedTier, SharedEntry, SharedTier, SharedValue};
pub use transport::{Delivery, InMemoryBus, InvalidationMessage, InvalidationTransport};
