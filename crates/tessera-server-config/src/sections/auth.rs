// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization gate settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
	pub decision_ttl_secs: u64,
	pub decision_cache_capacity: usize,
}

impl AuthConfig {
	pub fn decision_ttl(&self) -> Duration {
		Duration::from_secs(self.decision_ttl_secs)
	}
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthConfigLayer {
	pub decision_ttl_secs: Option<u64>,
	pub decision_cache_capacity: Option<usize>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.decision_ttl_secs.is_some() {
			self.decision_ttl_secs = other.decision_ttl_secs;
		}
		if other.decision_cache_capacity.is_some() {
			self.decision_cache_capacity = other.decision_cache_capacity;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		AuthConfig {
			decision_ttl_secs: self.decision_ttl_secs.unwrap_or(30),
			decision_cache_capacity: self.decision_cache_capacity.unwrap_or(10_000),
		}
	}
}
