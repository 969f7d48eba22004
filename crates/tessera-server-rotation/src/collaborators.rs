// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Systems a rotation talks to: whatever mints new secret values, the
//! consumers reporting health, and whoever is told about rotations.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tessera_common_secret::SecretBytes;
use tessera_config_core::ConfigKey;
use tracing::{info, warn};

use crate::error::Result;
use crate::job::RotationJob;

#[async_trait]
pub trait SecretGenerator: Send + Sync {
	async fn generate(&self, secret: &ConfigKey) -> Result<SecretBytes>;

	/// Functional check of a candidate against the system it authenticates,
	/// run before the candidate is written.
	async fn validate(&self, _secret: &ConfigKey, candidate: &SecretBytes) -> Result<bool> {
		Ok(!candidate.is_empty())
	}
}

/// Generates 256-bit random tokens, base64url encoded.
pub struct RandomSecretGenerator {
	bytes: usize,
}

impl Default for RandomSecretGenerator {
	fn default() -> Self {
		Self { bytes: 32 }
	}
}

impl RandomSecretGenerator {
	pub fn with_length(bytes: usize) -> Self {
		Self { bytes }
	}
}

#[async_trait]
impl SecretGenerator for RandomSecretGenerator {
	async fn generate(&self, _secret: &ConfigKey) -> Result<SecretBytes> {
		let mut raw = vec![0u8; self.bytes];
		OsRng.fill_bytes(&mut raw);
		let token = URL_SAFE_NO_PAD.encode(&raw);
		Ok(SecretBytes::new(token.into_bytes()))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthSignal {
	Healthy,
	Unhealthy(String),
}

/// A consumer of the secret reporting whether it works with `version`.
#[async_trait]
pub trait HealthCheck: Send + Sync {
	fn name(&self) -> &str;

	async fn check(&self, secret: &ConfigKey, version: u64) -> HealthSignal;
}

#[async_trait]
pub trait RotationNotifier: Send + Sync {
	/// Sent `lead` before the new value is generated.
	async fn pre_rotation(&self, job: &RotationJob, lead: Duration);

	/// Raised when a rotation rolls back.
	async fn alert(&self, job: &RotationJob, reason: &str);
}

/// Logs notifications.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl RotationNotifier for TracingNotifier {
	async fn pre_rotation(&self, job: &RotationJob, lead: Duration) {
		info!(
			job_id = %job.id,
			secret = %job.secret,
			lead_secs = lead.as_secs(),
			"secret rotation upcoming"
		);
	}

	async fn alert(&self, job: &RotationJob, reason: &str) {
		warn!(job_id = %job.id, secret = %job.secret, reason, "secret rotation rolled back");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tessera_config_core::Environment;

	#[tokio::test]
	async fn random_tokens_differ_and_validate() {
		let generator = RandomSecretGenerator::default();
		let key = ConfigKey::new("t1", "svc", "token", Environment::Production);

		let a = generator.generate(&key).await.unwrap();
		let b = generator.generate(&key).await.unwrap();

		assert_eq!(a.len(), 43);
		assert_ne!(a.expose(), b.expose());
		assert!(generator.validate(&key, &a).await.unwrap());
		assert!(!generator
			.validate(&key, &SecretBytes::new(Vec::new()))
			.await
			.unwrap());
	}
}
