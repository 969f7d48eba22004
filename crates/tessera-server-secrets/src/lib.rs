// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope encryption for Tessera secrets.
//!
//! Every secret is encrypted under a fresh 256-bit data-encryption key (DEK)
//! with AES-256-GCM. The DEK is wrapped by the tenant's active
//! key-encryption key (KEK), which never leaves the key-management provider.
//!
//! - [`KeyManagementProvider`]: external KMS contract, with [`LocalKms`] for
//!   development and tests
//! - [`KeyHierarchy`]: per-tenant KEK lifecycle (provision, rotate, retire)
//! - [`EncryptionEngine`]: `encrypt` / `decrypt` / `rewrap` of [`EncryptedPayload`]s
//!
//! [`EncryptedPayload`]: tessera_config_core::EncryptedPayload

pub mod crypto;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod kek_cache;
pub mod kms;

pub use engine::EncryptionEngine;
pub use error::{CryptoError, CryptoResult, KmsError};
pub use hierarchy::{KeyAccess, KeyHierarchy, RewrapRequest, WrappedKeyReferences};
pub use kek_cache::KekCache;
pub use kms::{KeyManagementProvider, LocalKms};
