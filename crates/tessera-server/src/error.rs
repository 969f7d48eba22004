// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;
use tessera_server_audit::AuditError;
use tessera_server_auth::AuthzError;
use tessera_server_cache::CacheError;
use tessera_server_config::ConfigError;
use tessera_server_db::StoreError;
use tessera_server_rotation::RotationError;
use tessera_server_secrets::CryptoError;
use thiserror::Error;

/// Error returned by [`ConfigService`](crate::ConfigService) operations.
///
/// Messages never name the policy rule behind a denial and never carry
/// secret material.
#[derive(Debug, Error)]
pub enum ServiceError {
	#[error(transparent)]
	Authz(#[from] AuthzError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Cache(#[from] CacheError),

	#[error(transparent)]
	Crypto(#[from] CryptoError),

	#[error(transparent)]
	Rotation(#[from] RotationError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Audit(#[from] AuditError),

	#[error("invalid request: {0}")]
	InvalidInput(String),

	#[error("startup failed: {0}")]
	Startup(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			ServiceError::Authz(e) => e.kind(),
			ServiceError::Store(e) => e.kind(),
			ServiceError::Cache(e) => e.kind(),
			ServiceError::Crypto(e) => e.kind(),
			ServiceError::Rotation(e) => e.kind(),
			ServiceError::Config(_) | ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
			ServiceError::Audit(_) | ServiceError::Startup(_) => ErrorKind::Internal,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn denial_keeps_its_kind_and_hides_the_rule() {
		let err = ServiceError::from(AuthzError::Forbidden {
			action: "read".into(),
			resource: "secret:t1/svc/db_pass@production".into(),
		});
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		assert!(!err.to_string().contains("default-deny"));
		assert!(!err.kind().is_retryable());
	}

	#[test]
	fn rotation_conflicts_are_retryable() {
		let err = ServiceError::from(RotationError::InProgress("t1/svc/db_pass@production".into()));
		assert_eq!(err.kind(), ErrorKind::RotationInProgress);
		assert!(err.kind().is_retryable());
	}
}
