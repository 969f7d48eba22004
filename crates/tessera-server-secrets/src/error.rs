// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for key management and envelope encryption.
//!
//! Messages never include plaintext, DEKs or KEK material.

use tessera_config_core::{ErrorKind, KekId, TenantId};
use thiserror::Error;

/// Errors returned by a [`KeyManagementProvider`](crate::KeyManagementProvider).
#[derive(Debug, Error)]
pub enum KmsError {
	#[error("key management provider unavailable: {0}")]
	Unavailable(String),

	#[error("key {0} not found")]
	KeyNotFound(KekId),

	#[error("key {0} has been destroyed")]
	KeyDestroyed(KekId),

	#[error("wrapped key could not be opened")]
	UnwrapFailed,

	#[error("key management error: {0}")]
	Internal(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
	#[error("key unavailable: {0}")]
	KeyUnavailable(String),

	#[error("encryption failed: {0}")]
	EncryptionFailed(String),

	#[error("authentication failed")]
	AuthenticationFailed,

	#[error("tenant isolation violation for tenant {tenant}")]
	TenantIsolationViolation { tenant: TenantId },

	#[error("unknown key {0}")]
	UnknownKey(KekId),

	#[error("invalid payload: {0}")]
	InvalidPayload(String),

	#[error("key {kek_id} is still referenced by {references} wrapped DEKs")]
	KeyStillReferenced { kek_id: KekId, references: usize },

	#[error("key {0} is active and cannot be retired")]
	KeyActive(KekId),

	#[error("internal error: {0}")]
	Internal(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl CryptoError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			CryptoError::KeyUnavailable(_) => ErrorKind::KeyUnavailable,
			CryptoError::EncryptionFailed(_) => ErrorKind::EncryptionFailed,
			CryptoError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
			CryptoError::TenantIsolationViolation { .. } => ErrorKind::TenantIsolationViolation,
			CryptoError::UnknownKey(_) => ErrorKind::NotFound,
			CryptoError::InvalidPayload(_)
			| CryptoError::KeyStillReferenced { .. }
			| CryptoError::KeyActive(_) => ErrorKind::InvalidInput,
			CryptoError::Internal(_) => ErrorKind::Internal,
		}
	}
}

impl From<KmsError> for CryptoError {
	fn from(e: KmsError) -> Self {
		match e {
			KmsError::Unavailable(msg) => CryptoError::KeyUnavailable(msg),
			KmsError::KeyNotFound(kek) => CryptoError::UnknownKey(kek),
			KmsError::KeyDestroyed(kek) => {
				CryptoError::KeyUnavailable(format!("key {kek} has been destroyed"))
			}
			KmsError::UnwrapFailed => CryptoError::AuthenticationFailed,
			KmsError::Internal(msg) => CryptoError::Internal(msg),
		}
	}
}
