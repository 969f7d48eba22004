// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key-management provider contract and an in-process implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_config_core::{KekId, TenantId};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_SIZE};
use crate::error::KmsError;

/// External key-management service.
///
/// Implementations hold KEK material and never return it. Only wrapped DEKs
/// cross this boundary.
#[async_trait]
pub trait KeyManagementProvider: Send + Sync {
	fn name(&self) -> &str;

	async fn wrap(&self, kek_id: &KekId, plaintext_key: &[u8]) -> Result<Vec<u8>, KmsError>;

	async fn unwrap(&self, kek_id: &KekId, ciphertext: &[u8])
		-> Result<Zeroizing<Vec<u8>>, KmsError>;

	async fn create_key(&self, tenant_id: &TenantId) -> Result<KekId, KmsError>;

	/// Schedules destruction of a key and returns when it becomes due.
	async fn schedule_deletion(
		&self,
		kek_id: &KekId,
		grace_period: Duration,
	) -> Result<DateTime<Utc>, KmsError>;
}

struct LocalKey {
	material: Zeroizing<[u8; KEY_SIZE]>,
	deletion_due_at: Option<DateTime<Utc>>,
}

/// In-process provider holding KEKs in memory.
///
/// Suitable for development and tests. Availability and latency can be
/// controlled to exercise timeout and outage handling.
#[derive(Default)]
pub struct LocalKms {
	keys: RwLock<HashMap<KekId, LocalKey>>,
	unavailable: AtomicBool,
	latency_ms: AtomicU64,
	wrap_calls: AtomicU64,
	unwrap_calls: AtomicU64,
}

impl LocalKms {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every subsequent call fail with [`KmsError::Unavailable`].
	pub fn set_available(&self, available: bool) {
		self.unavailable.store(!available, Ordering::SeqCst);
	}

	/// Adds artificial latency to every call.
	pub fn set_latency(&self, latency: Duration) {
		self.latency_ms
			.store(latency.as_millis() as u64, Ordering::SeqCst);
	}

	pub fn wrap_calls(&self) -> u64 {
		self.wrap_calls.load(Ordering::SeqCst)
	}

	pub fn unwrap_calls(&self) -> u64 {
		self.unwrap_calls.load(Ordering::SeqCst)
	}

	async fn simulate_network(&self) -> Result<(), KmsError> {
		let latency = self.latency_ms.load(Ordering::SeqCst);
		if latency > 0 {
			tokio::time::sleep(Duration::from_millis(latency)).await;
		}
		if self.unavailable.load(Ordering::SeqCst) {
			return Err(KmsError::Unavailable("local kms disabled".to_string()));
		}
		Ok(())
	}

	fn with_live_key<T>(
		&self,
		kek_id: &KekId,
		f: impl FnOnce(&[u8; KEY_SIZE]) -> Result<T, KmsError>,
	) -> Result<T, KmsError> {
		let keys = self
			.keys
			.read()
			.map_err(|_| KmsError::Internal("key table lock poisoned".to_string()))?;
		let key = keys
			.get(kek_id)
			.ok_or_else(|| KmsError::KeyNotFound(kek_id.clone()))?;
		if let Some(due) = key.deletion_due_at {
			if Utc::now() >= due {
				return Err(KmsError::KeyDestroyed(kek_id.clone()));
			}
		}
		f(&key.material)
	}
}

#[async_trait]
impl KeyManagementProvider for LocalKms {
	fn name(&self) -> &str {
		"local"
	}

	async fn wrap(&self, kek_id: &KekId, plaintext_key: &[u8]) -> Result<Vec<u8>, KmsError> {
		self.simulate_network().await?;
		self.wrap_calls.fetch_add(1, Ordering::SeqCst);
		self.with_live_key(kek_id, |kek| {
			crypto::wrap_key(kek, plaintext_key, kek_id.as_str().as_bytes())
				.map_err(|e| KmsError::Internal(e.to_string()))
		})
	}

	async fn unwrap(
		&self,
		kek_id: &KekId,
		ciphertext: &[u8],
	) -> Result<Zeroizing<Vec<u8>>, KmsError> {
		self.simulate_network().await?;
		self.unwrap_calls.fetch_add(1, Ordering::SeqCst);
		self.with_live_key(kek_id, |kek| {
			crypto::unwrap_key(kek, ciphertext, kek_id.as_str().as_bytes())
				.map_err(|_| KmsError::UnwrapFailed)
		})
	}

	async fn create_key(&self, tenant_id: &TenantId) -> Result<KekId, KmsError> {
		self.simulate_network().await?;
		let kek_id = KekId::new(format!("local:{}:{}", tenant_id, uuid::Uuid::new_v4()));
		let mut keys = self
			.keys
			.write()
			.map_err(|_| KmsError::Internal("key table lock poisoned".to_string()))?;
		keys.insert(
			kek_id.clone(),
			LocalKey {
				material: crypto::generate_key(),
				deletion_due_at: None,
			},
		);
		info!(kek_id = %kek_id, tenant_id = %tenant_id, "created local KEK");
		Ok(kek_id)
	}

	async fn schedule_deletion(
		&self,
		kek_id: &KekId,
		grace_period: Duration,
	) -> Result<DateTime<Utc>, KmsError> {
		self.simulate_network().await?;
		let grace = chrono::Duration::from_std(grace_period)
			.map_err(|e| KmsError::Internal(format!("invalid grace period: {e}")))?;
		let due = Utc::now() + grace;
		let mut keys = self
			.keys
			.write()
			.map_err(|_| KmsError::Internal("key table lock poisoned".to_string()))?;
		let key = keys
			.get_mut(kek_id)
			.ok_or_else(|| KmsError::KeyNotFound(kek_id.clone()))?;
		key.deletion_due_at = Some(due);
		debug!(kek_id = %kek_id, due = %due, "scheduled local KEK deletion");
		Ok(due)
	}
}
