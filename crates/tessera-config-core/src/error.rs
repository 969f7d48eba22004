// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error taxonomy shared by every component.
//!
//! Each crate defines its own `thiserror` enum and exposes a `kind()` method
//! mapping into [`ErrorKind`], so retry and audit decisions are made uniformly.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	NotFound,
	SchemaMismatch,
	AuthenticationFailed,
	KeyUnavailable,
	EncryptionFailed,
	TenantIsolationViolation,
	Unauthorized,
	Forbidden,
	RotationInProgress,
	QuotaExceeded,
	VersionConflict,
	InvalidInput,
	Internal,
}

impl ErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::NotFound => "not_found",
			ErrorKind::SchemaMismatch => "schema_mismatch",
			ErrorKind::AuthenticationFailed => "authentication_failed",
			ErrorKind::KeyUnavailable => "key_unavailable",
			ErrorKind::EncryptionFailed => "encryption_failed",
			ErrorKind::TenantIsolationViolation => "tenant_isolation_violation",
			ErrorKind::Unauthorized => "unauthorized",
			ErrorKind::Forbidden => "forbidden",
			ErrorKind::RotationInProgress => "rotation_in_progress",
			ErrorKind::QuotaExceeded => "quota_exceeded",
			ErrorKind::VersionConflict => "version_conflict",
			ErrorKind::InvalidInput => "invalid_input",
			ErrorKind::Internal => "internal",
		}
	}

	/// Whether a caller may retry the same request later.
	///
	/// Cryptographic and authorization failures are never retryable.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ErrorKind::KeyUnavailable | ErrorKind::RotationInProgress | ErrorKind::VersionConflict
		)
	}

	/// Whether the failure must be recorded as a security event.
	pub fn is_security_event(&self) -> bool {
		matches!(
			self,
			ErrorKind::TenantIsolationViolation | ErrorKind::AuthenticationFailed
		)
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
