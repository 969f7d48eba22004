// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;
use tessera_server_db::StoreError;
use tessera_server_secrets::CryptoError;
use thiserror::Error;

use crate::job::RotationPhase;

#[derive(Debug, Error)]
pub enum RotationError {
	#[error("rotation already in progress for {0}")]
	InProgress(String),

	#[error("rotation job not found: {0}")]
	NotFound(String),

	#[error("{0} is not a secret")]
	NotASecret(String),

	#[error("cannot move rotation from {from} to {to}")]
	InvalidTransition {
		from: RotationPhase,
		to: RotationPhase,
	},

	#[error("secret generation failed: {0}")]
	Generation(String),

	#[error("job store error: {0}")]
	JobStore(String),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, RotationError>;

impl RotationError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			RotationError::InProgress(_) => ErrorKind::RotationInProgress,
			RotationError::NotFound(_) => ErrorKind::NotFound,
			RotationError::NotASecret(_) | RotationError::InvalidTransition { .. } => {
				ErrorKind::InvalidInput
			}
			RotationError::Generation(_) | RotationError::JobStore(_) => ErrorKind::Internal,
			RotationError::Store(e) => e.kind(),
			RotationError::Crypto(e) => e.kind(),
		}
	}
}
