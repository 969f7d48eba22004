// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Tessera configuration and secret store.
//!
//! This crate provides the data model shared by every server component:
//! - Identity newtypes ([`TenantId`], [`ActorId`], [`KekId`]) and the
//!   [`ConfigKey`] that addresses a single configuration entry
//! - The environment precedence chain ([`Environment`])
//! - Stored values ([`ConfigValue`]) and resolved values ([`ResolvedValue`])
//! - Envelope-encrypted payloads ([`EncryptedPayload`])
//! - Versioned entries ([`ConfigEntry`], [`ConfigVersion`]) and tenant keys ([`TenantKey`])
//! - The error taxonomy every component maps into ([`ErrorKind`])

pub mod entry;
pub mod environment;
pub mod error;
pub mod ids;
pub mod key;
pub mod payload;
pub mod value;

pub use entry::{ChangeKind, ConfigEntry, ConfigVersion, VersionState};
pub use environment::Environment;
pub use error::ErrorKind;
pub use ids::{ActorId, ConfigKey, KekId, TenantId};
pub use key::{KeyStatus, TenantKey};
pub use payload::{Algorithm, EncryptedPayload, ENVELOPE_FORMAT_VERSION};
pub use value::{ConfigValue, ResolvedValue, ValueType};
