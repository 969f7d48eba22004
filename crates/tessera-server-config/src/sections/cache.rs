// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Two-tier cache and invalidation fan-out settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INVALIDATION_TOPIC: &str = "tessera.cache.invalidate";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
	pub local_capacity: usize,
	pub local_ttl_secs: u64,
	pub shared_ttl_secs: u64,
	pub invalidation_topic: String,
	pub broadcast_retry_attempts: u32,
	pub broadcast_retry_base_ms: u64,
}

impl CacheConfig {
	pub fn local_ttl(&self) -> Duration {
		Duration::from_secs(self.local_ttl_secs)
	}

	pub fn shared_ttl(&self) -> Duration {
		Duration::from_secs(self.shared_ttl_secs)
	}

	pub fn broadcast_retry_base(&self) -> Duration {
		Duration::from_millis(self.broadcast_retry_base_ms)
	}
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheConfigLayer {
	pub local_capacity: Option<usize>,
	pub local_ttl_secs: Option<u64>,
	pub shared_ttl_secs: Option<u64>,
	pub invalidation_topic: Option<String>,
	pub broadcast_retry_attempts: Option<u32>,
	pub broadcast_retry_base_ms: Option<u64>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.local_capacity.is_some() {
			self.local_capacity = other.local_capacity;
		}
		if other.local_ttl_secs.is_some() {
			self.local_ttl_secs = other.local_ttl_secs;
		}
		if other.shared_ttl_secs.is_some() {
			self.shared_ttl_secs = other.shared_ttl_secs;
		}
		if other.invalidation_topic.is_some() {
			self.invalidation_topic = other.invalidation_topic;
		}
		if other.broadcast_retry_attempts.is_some() {
			self.broadcast_retry_attempts = other.broadcast_retry_attempts;
		}
		if other.broadcast_retry_base_ms.is_some() {
			self.broadcast_retry_base_ms = other.broadcast_retry_base_ms;
		}
	}

	pub fn finalize(self) -> CacheConfig {
		CacheConfig {
			local_capacity: self.local_capacity.unwrap_or(1_000),
			local_ttl_secs: self.local_ttl_secs.unwrap_or(60),
			shared_ttl_secs: self.shared_ttl_secs.unwrap_or(600),
			invalidation_topic: self
				.invalidation_topic
				.unwrap_or_else(|| DEFAULT_INVALIDATION_TOPIC.to_string()),
			broadcast_retry_attempts: self.broadcast_retry_attempts.unwrap_or(5),
			broadcast_retry_base_ms: self.broadcast_retry_base_ms.unwrap_or(50),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_local_tier_is_shorter_lived() {
		let config = CacheConfig::default();
		assert!(config.local_ttl() < config.shared_ttl());
		assert_eq!(config.invalidation_topic, DEFAULT_INVALIDATION_TOPIC);
	}
}
