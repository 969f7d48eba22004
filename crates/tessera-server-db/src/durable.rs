// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Contract required of a durable configuration backend.

use async_trait::async_trait;
use tessera_config_core::{
	ActorId, ChangeKind, ConfigEntry, ConfigKey, ConfigValue, ConfigVersion, KekId, TenantId,
	VersionState,
};

use crate::error::Result;

/// A version to append on top of `expected_version`.
#[derive(Debug, Clone)]
pub struct AppendRequest {
	pub key: ConfigKey,
	/// Current version the writer observed; `0` when the entry must not exist.
	pub expected_version: u64,
	/// `None` appends a delete tombstone.
	pub payload: Option<ConfigValue>,
	pub change_kind: ChangeKind,
	pub changed_by: ActorId,
	pub change_reason: Option<String>,
	pub rollback_target: Option<u64>,
	pub schema_version: Option<u32>,
}

/// Durable, strictly consistent storage of entries and their versions.
///
/// `append_version` is atomic: it either writes version `expected_version + 1`
/// and advances the entry head, or fails with
/// [`StoreError::VersionConflict`](crate::StoreError::VersionConflict).
#[async_trait]
pub trait DurableStore: Send + Sync {
	fn backend(&self) -> &'static str;

	async fn append_version(&self, request: AppendRequest) -> Result<ConfigVersion>;

	async fn read_version(&self, key: &ConfigKey, version: u64) -> Result<Option<ConfigVersion>>;

	/// The version the entry head points at, tombstones included.
	async fn read_current(&self, key: &ConfigKey) -> Result<Option<ConfigVersion>>;

	async fn read_entry(&self, key: &ConfigKey) -> Result<Option<ConfigEntry>>;

	/// Retained versions, oldest first.
	async fn history(&self, key: &ConfigKey) -> Result<Vec<ConfigVersion>>;

	async fn set_version_state(
		&self,
		key: &ConfigKey,
		version: u64,
		state: VersionState,
	) -> Result<()>;

	/// Replaces the payload of a stored version in place.
	///
	/// Only used to re-wrap secret DEKs; the plaintext must be unchanged.
	async fn replace_payload(&self, key: &ConfigKey, version: u64, payload: ConfigValue)
		-> Result<()>;

	/// Removes the oldest versions beyond `keep_latest`, never the current one.
	/// Returns the removed version numbers.
	async fn prune(&self, key: &ConfigKey, keep_latest: usize) -> Result<Vec<u64>>;

	/// Live (non-deleted) entries of a tenant.
	async fn count_entries(&self, tenant_id: &TenantId) -> Result<usize>;

	async fn list_entries(&self, tenant_id: &TenantId) -> Result<Vec<ConfigEntry>>;

	/// Stored versions holding a secret whose DEK is wrapped under `kek_id`.
	async fn find_by_kek(&self, kek_id: &KekId) -> Result<Vec<ConfigVersion>>;
}

/// Version numbers to drop so that at most `keep_latest` remain.
///
/// `numbers` must be ascending. The current version always survives.
pub(crate) fn select_prunable(numbers: &[u64], keep_latest: usize, current: u64) -> Vec<u64> {
	let keep = keep_latest.max(1);
	if numbers.len() <= keep {
		return Vec::new();
	}
	let excess = numbers.len() - keep;
	numbers
		.iter()
		.copied()
		.filter(|n| *n != current)
		.take(excess)
		.collect()
}
