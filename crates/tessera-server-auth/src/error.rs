// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;
use thiserror::Error;

/// Authorization failures returned to callers.
///
/// Messages never name the rule that produced the decision; that is only
/// recorded in the audit trail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
	#[error("unauthorized: request carries no identity")]
	Unauthorized,

	#[error("forbidden: {action} on {resource}")]
	Forbidden { action: String, resource: String },

	#[error("policy evaluation failed: {0}")]
	Policy(String),

	#[error("invalid grant: {0}")]
	InvalidGrant(String),
}

pub type Result<T> = std::result::Result<T, AuthzError>;

impl AuthzError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			AuthzError::Unauthorized => ErrorKind::Unauthorized,
			AuthzError::Forbidden { .. } => ErrorKind::Forbidden,
			AuthzError::Policy(_) => ErrorKind::Internal,
			AuthzError::InvalidGrant(_) => ErrorKind::InvalidInput,
		}
	}
}
