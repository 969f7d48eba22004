// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope encryption and key-management settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_KMS_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_KEK_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_KEK_DELETION_GRACE_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CryptoConfig {
	/// Upper bound on any single key-management call.
	pub kms_timeout_ms: u64,
	/// TTL of the in-memory active-KEK lookup cache.
	pub kek_cache_ttl_secs: u64,
	/// Grace period between scheduling a KEK for deletion and destroying it.
	pub kek_deletion_grace_secs: u64,
}

impl CryptoConfig {
	pub fn kms_timeout(&self) -> Duration {
		Duration::from_millis(self.kms_timeout_ms)
	}

	pub fn kek_cache_ttl(&self) -> Duration {
		Duration::from_secs(self.kek_cache_ttl_secs)
	}

	pub fn kek_deletion_grace(&self) -> Duration {
		Duration::from_secs(self.kek_deletion_grace_secs)
	}
}

impl Default for CryptoConfig {
	fn default() -> Self {
		CryptoConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CryptoConfigLayer {
	pub kms_timeout_ms: Option<u64>,
	pub kek_cache_ttl_secs: Option<u64>,
	pub kek_deletion_grace_secs: Option<u64>,
}

impl CryptoConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.kms_timeout_ms.is_some() {
			self.kms_timeout_ms = other.kms_timeout_ms;
		}
		if other.kek_cache_ttl_secs.is_some() {
			self.kek_cache_ttl_secs = other.kek_cache_ttl_secs;
		}
		if other.kek_deletion_grace_secs.is_some() {
			self.kek_deletion_grace_secs = other.kek_deletion_grace_secs;
		}
	}

	pub fn finalize(self) -> CryptoConfig {
		CryptoConfig {
			kms_timeout_ms: self.kms_timeout_ms.unwrap_or(DEFAULT_KMS_TIMEOUT_MS),
			kek_cache_ttl_secs: self.kek_cache_ttl_secs.unwrap_or(DEFAULT_KEK_CACHE_TTL_SECS),
			kek_deletion_grace_secs: self
				.kek_deletion_grace_secs
				.unwrap_or(DEFAULT_KEK_DELETION_GRACE_SECS),
		}
	}
}
