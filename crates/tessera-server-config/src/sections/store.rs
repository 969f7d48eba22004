// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Version store retention and tenant quota settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
	/// Versions kept per entry by retention pruning.
	pub retention_keep_latest: usize,
	pub max_entries_per_tenant: usize,
	pub max_value_bytes: usize,
	/// Attempts for an append that lost an optimistic version race.
	pub write_retry_attempts: u32,
}

impl Default for StoreConfig {
	fn default() -> Self {
		StoreConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreConfigLayer {
	pub retention_keep_latest: Option<usize>,
	pub max_entries_per_tenant: Option<usize>,
	pub max_value_bytes: Option<usize>,
	pub write_retry_attempts: Option<u32>,
}

impl StoreConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.retention_keep_latest.is_some() {
			self.retention_keep_latest = other.retention_keep_latest;
		}
		if other.max_entries_per_tenant.is_some() {
			self.max_entries_per_tenant = other.max_entries_per_tenant;
		}
		if other.max_value_bytes.is_some() {
			self.max_value_bytes = other.max_value_bytes;
		}
		if other.write_retry_attempts.is_some() {
			self.write_retry_attempts = other.write_retry_attempts;
		}
	}

	pub fn finalize(self) -> StoreConfig {
		StoreConfig {
			retention_keep_latest: self.retention_keep_latest.unwrap_or(50),
			max_entries_per_tenant: self.max_entries_per_tenant.unwrap_or(10_000),
			max_value_bytes: self.max_value_bytes.unwrap_or(1024 * 1024),
			write_retry_attempts: self.write_retry_attempts.unwrap_or(3),
		}
	}
}
