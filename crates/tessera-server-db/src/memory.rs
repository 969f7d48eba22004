// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-process [`DurableStore`] for development and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tessera_config_core::{
	ConfigEntry, ConfigKey, ConfigValue, ConfigVersion, KekId, TenantId, VersionState,
};
use tokio::sync::RwLock;

use crate::durable::{select_prunable, AppendRequest, DurableStore};
use crate::error::{Result, StoreError};

struct Record {
	entry: ConfigEntry,
	versions: BTreeMap<u64, ConfigVersion>,
}

#[derive(Default)]
pub struct InMemoryStore {
	records: RwLock<HashMap<ConfigKey, Record>>,
}

impl InMemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

fn not_found(key: &ConfigKey, version: u64) -> StoreError {
	StoreError::NotFound(format!("{} version {version}", key.config_id()))
}

#[async_trait]
impl DurableStore for InMemoryStore {
	fn backend(&self) -> &'static str {
		"memory"
	}

	async fn append_version(&self, request: AppendRequest) -> Result<ConfigVersion> {
		let mut records = self.records.write().await;
		let actual = records
			.get(&request.key)
			.map(|r| r.entry.current_version)
			.unwrap_or(0);
		if actual != request.expected_version {
			return Err(StoreError::VersionConflict {
				config_id: request.key.config_id(),
				expected: request.expected_version,
				actual,
			});
		}

		let version = ConfigVersion {
			config_id: request.key.clone(),
			version_number: actual + 1,
			payload: request.payload,
			change_kind: request.change_kind,
			changed_by: request.changed_by,
			changed_at: Utc::now(),
			change_reason: request.change_reason,
			rollback_target: request.rollback_target,
			state: VersionState::Active,
		};

		match records.get_mut(&request.key) {
			Some(record) => {
				record.entry.advance(&version, request.schema_version);
				record
					.versions
					.insert(version.version_number, version.clone());
			}
			None => {
				let mut versions = BTreeMap::new();
				versions.insert(version.version_number, version.clone());
				records.insert(
					request.key,
					Record {
						entry: ConfigEntry::from_first_version(&version, request.schema_version),
						versions,
					},
				);
			}
		}
		Ok(version)
	}

	async fn read_version(&self, key: &ConfigKey, version: u64) -> Result<Option<ConfigVersion>> {
		Ok(self
			.records
			.read()
			.await
			.get(key)
			.and_then(|r| r.versions.get(&version).cloned()))
	}

	async fn read_current(&self, key: &ConfigKey) -> Result<Option<ConfigVersion>> {
		Ok(self
			.records
			.read()
			.await
			.get(key)
			.and_then(|r| r.versions.get(&r.entry.current_version).cloned()))
	}

	async fn read_entry(&self, key: &ConfigKey) -> Result<Option<ConfigEntry>> {
		Ok(self.records.read().await.get(key).map(|r| r.entry.clone()))
	}

	async fn history(&self, key: &ConfigKey) -> Result<Vec<ConfigVersion>> {
		Ok(self
			.records
			.read()
			.await
			.get(key)
			.map(|r| r.versions.values().cloned().collect())
			.unwrap_or_default())
	}

	async fn set_version_state(
		&self,
		key: &ConfigKey,
		version: u64,
		state: VersionState,
	) -> Result<()> {
		let mut records = self.records.write().await;
		let stored = records
			.get_mut(key)
			.and_then(|r| r.versions.get_mut(&version))
			.ok_or_else(|| not_found(key, version))?;
		stored.state = state;
		Ok(())
	}

	async fn replace_payload(
		&self,
		key: &ConfigKey,
		version: u64,
		payload: ConfigValue,
	) -> Result<()> {
		let mut records = self.records.write().await;
		let stored = records
			.get_mut(key)
			.and_then(|r| r.versions.get_mut(&version))
			.ok_or_else(|| not_found(key, version))?;
		if stored.payload.is_none() {
			return Err(StoreError::InvalidInput(format!(
				"{} version {version} is a tombstone",
				key.config_id()
			)));
		}
		stored.payload = Some(payload);
		Ok(())
	}

	async fn prune(&self, key: &ConfigKey, keep_latest: usize) -> Result<Vec<u64>> {
		let mut records = self.records.write().await;
		let Some(record) = records.get_mut(key) else {
			return Ok(Vec::new());
		};
		let numbers: Vec<u64> = record.versions.keys().copied().collect();
		let removed = select_prunable(&numbers, keep_latest, record.entry.current_version);
		for number in &removed {
			record.versions.remove(number);
		}
		Ok(removed)
	}

	async fn count_entries(&self, tenant_id: &TenantId) -> Result<usize> {
		Ok(self
			.records
			.read()
			.await
			.values()
			.filter(|r| &r.entry.key.tenant == tenant_id && !r.entry.deleted)
			.count())
	}

	async fn list_entries(&self, tenant_id: &TenantId) -> Result<Vec<ConfigEntry>> {
		let mut entries: Vec<ConfigEntry> = self
			.records
			.read()
			.await
			.values()
			.filter(|r| &r.entry.key.tenant == tenant_id)
			.map(|r| r.entry.clone())
			.collect();
		entries.sort_by(|a, b| a.key.cmp(&b.key));
		Ok(entries)
	}

	async fn find_by_kek(&self, kek_id: &KekId) -> Result<Vec<ConfigVersion>> {
		Ok(self
			.records
			.read()
			.await
			.values()
			.flat_map(|r| r.versions.values())
			.filter(|v| {
				v.payload
					.as_ref()
					.is_some_and(|p| p.references_kek(kek_id))
			})
			.cloned()
			.collect())
	}
}
