// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Version conflict on {config_id}: expected {expected}, found {actual}")]
	VersionConflict {
		config_id: String,
		expected: u64,
		actual: u64,
	},

	#[error("Quota exceeded: {limit} (limit {max})")]
	QuotaExceeded { limit: &'static str, max: usize },

	#[error("{config_id} is held by {holder}")]
	Held { config_id: String, holder: String },

	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			StoreError::NotFound(_) => ErrorKind::NotFound,
			StoreError::VersionConflict { .. } => ErrorKind::VersionConflict,
			StoreError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
			StoreError::Held { .. } => ErrorKind::RotationInProgress,
			StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
			StoreError::Sqlx(_) | StoreError::Serialization(_) | StoreError::Internal(_) => {
				ErrorKind::Internal
			}
		}
	}
}
