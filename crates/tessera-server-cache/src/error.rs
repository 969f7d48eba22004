// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tessera_config_core::ErrorKind;
use tessera_server_resolve::ResolveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
	#[error("invalidation transport unavailable: {0}")]
	TransportUnavailable(String),

	#[error("shared tier error: {0}")]
	SharedTier(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error(transparent)]
	Resolve(#[from] ResolveError),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			CacheError::Resolve(e) => e.kind(),
			CacheError::TransportUnavailable(_)
			| CacheError::SharedTier(_)
			| CacheError::Serialization(_) => ErrorKind::Internal,
		}
	}
}
