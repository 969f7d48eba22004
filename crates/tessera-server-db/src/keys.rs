// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence of tenant KEK records.
//!
//! The key-management provider holds the key material; these records hold
//! which tenant owns each key and where it is in its lifecycle.

use std::collections::HashMap;

use async_trait::async_trait;
use tessera_config_core::{KekId, TenantKey};
use tokio::sync::RwLock;

use crate::error::Result;

#[async_trait]
pub trait TenantKeyStore: Send + Sync {
	/// Inserts or replaces the record for `key.kek_id`.
	async fn save_key(&self, key: &TenantKey) -> Result<()>;

	/// Every stored record, oldest first.
	async fn load_keys(&self) -> Result<Vec<TenantKey>>;

	async fn remove_key(&self, kek_id: &KekId) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryKeyStore {
	keys: RwLock<HashMap<KekId, TenantKey>>,
}

impl InMemoryKeyStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl TenantKeyStore for InMemoryKeyStore {
	async fn save_key(&self, key: &TenantKey) -> Result<()> {
		self.keys
			.write()
			.await
			.insert(key.kek_id.clone(), key.clone());
		Ok(())
	}

	async fn load_keys(&self) -> Result<Vec<TenantKey>> {
		let mut keys: Vec<TenantKey> = self.keys.read().await.values().cloned().collect();
		keys.sort_by(|a, b| {
			a.created_at
				.cmp(&b.created_at)
				.then_with(|| a.kek_id.cmp(&b.kek_id))
		});
		Ok(keys)
	}

	async fn remove_key(&self, kek_id: &KekId) -> Result<bool> {
		Ok(self.keys.write().await.remove(kek_id).is_some())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tessera_config_core::{KeyStatus, TenantId};

	#[tokio::test]
	async fn saving_twice_replaces_the_record() {
		let store = InMemoryKeyStore::new();
		let mut key = TenantKey::new_active(TenantId::new("t1"), KekId::new("k1"));
		store.save_key(&key).await.unwrap();

		key.status = KeyStatus::Deprecated;
		store.save_key(&key).await.unwrap();

		let loaded = store.load_keys().await.unwrap();
		assert_eq!(loaded, vec![key]);
		assert!(store.remove_key(&KekId::new("k1")).await.unwrap());
		assert!(!store.remove_key(&KekId::new("k1")).await.unwrap());
		assert!(store.load_keys().await.unwrap().is_empty());
	}
}
