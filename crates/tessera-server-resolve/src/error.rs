// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;
use tessera_server_db::StoreError;
use tessera_server_secrets::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("{0} not found at any layer")]
	NotFound(String),

	#[error("schema mismatch at {path}: {reason}")]
	SchemaMismatch { path: String, reason: String },

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

impl ResolveError {
	pub fn mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
		ResolveError::SchemaMismatch {
			path: path.into(),
			reason: reason.into(),
		}
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			ResolveError::NotFound(_) => ErrorKind::NotFound,
			ResolveError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
			ResolveError::InvalidKey(_) => ErrorKind::InvalidInput,
			ResolveError::Store(e) => e.kind(),
			ResolveError::Crypto(e) => e.kind(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn crypto_kinds_pass_through() {
		let err: ResolveError = CryptoError::AuthenticationFailed.into();
		assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
		assert!(!err.kind().is_retryable());

		let err: ResolveError = CryptoError::KeyUnavailable("timeout".into()).into();
		assert!(err.kind().is_retryable());
	}
}
