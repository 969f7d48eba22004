// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolution of configuration values across environment layers.
//!
//! For a key at environment `E`, every layer of `E`'s precedence chain that
//! holds a live, active version is merged lowest first. Templates are then
//! rendered, secrets decrypted and the result checked against its declared
//! schema.

pub mod engine;
pub mod error;
pub mod merge;
pub mod schema;
pub mod template;

pub use engine::{Resolution, ResolutionEngine};
pub use error::{ResolveError, Result};
pub use merge::deep_merge;
pub use schema::{InMemorySchemaRegistry, Schema, SchemaRegistry};
pub use template::MAX_TEMPLATE_DEPTH;
