// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use serde_json::json;
use tessera_config_core::{
	ActorId, ChangeKind, ConfigEntry, ConfigKey, ConfigValue, ConfigVersion, KekId, TenantId,
	VersionState,
};
use tessera_server_audit::{AuditEventType, AuditLogEntry, AuditOutcome, AuditService};
use tessera_server_config::StoreConfig;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use crate::durable::{AppendRequest, DurableStore};
use crate::error::{Result, StoreError};
use crate::listener::{CommitEvent, CommitListener};

/// Append-only versioned store of configuration entries.
///
/// Every mutation of a `(tenant, namespace, key)` scope runs inside that
/// scope's exclusive section: read head, append, then notify commit
/// listeners. The section is released only after listeners return, so a
/// write is acknowledged after the local cache has been invalidated.
///
/// A key may be held by one holder (a rotation job). While held, only
/// `put_held` and `rollback_held` from that holder may append to it. The hold
/// is checked inside the scope section, so no write slips in between the
/// check and the append.
pub struct VersionStore {
	durable: Arc<dyn DurableStore>,
	locks: DashMap<String, Arc<Mutex<()>>>,
	holds: DashMap<ConfigKey, String>,
	listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
	config: StoreConfig,
	audit: Option<Arc<AuditService>>,
}

impl VersionStore {
	pub fn new(durable: Arc<dyn DurableStore>, config: StoreConfig) -> Self {
		Self {
			durable,
			locks: DashMap::new(),
			holds: DashMap::new(),
			listeners: RwLock::new(Vec::new()),
			config,
			audit: None,
		}
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
		match self.listeners.write() {
			Ok(mut listeners) => listeners.push(listener),
			Err(poisoned) => poisoned.into_inner().push(listener),
		}
	}

	pub fn backend(&self) -> &'static str {
		self.durable.backend()
	}

	/// Writes a new version of `key`, creating the entry if needed.
	pub async fn put(
		&self,
		key: &ConfigKey,
		value: ConfigValue,
		actor: &ActorId,
		reason: Option<String>,
	) -> Result<ConfigVersion> {
		self.write(key, value, None, actor, reason, None).await
	}

	pub async fn put_with_schema(
		&self,
		key: &ConfigKey,
		value: ConfigValue,
		schema_version: Option<u32>,
		actor: &ActorId,
		reason: Option<String>,
	) -> Result<ConfigVersion> {
		self.write(key, value, schema_version, actor, reason, None)
			.await
	}

	/// Writes on behalf of the current holder of `key`.
	pub async fn put_held(
		&self,
		key: &ConfigKey,
		value: ConfigValue,
		actor: &ActorId,
		reason: Option<String>,
		holder: &str,
	) -> Result<ConfigVersion> {
		self.write(key, value, None, actor, reason, Some(holder))
			.await
	}

	#[instrument(skip(self, value, reason), fields(config_id = %key, actor = %actor))]
	async fn write(
		&self,
		key: &ConfigKey,
		value: ConfigValue,
		schema_version: Option<u32>,
		actor: &ActorId,
		reason: Option<String>,
		holder: Option<&str>,
	) -> Result<ConfigVersion> {
		key.validate().map_err(StoreError::InvalidInput)?;

		let size = value.encoded_len();
		if size > self.config.max_value_bytes {
			return Err(self.quota_exceeded(
				key,
				actor,
				"max_value_bytes",
				self.config.max_value_bytes,
			));
		}

		let _scope = self.lock_scope(key).await;
		self.check_hold(key, holder)?;

		let version = self
			.append_with_retry(key, |current| {
				let live = current.filter(|v| !v.is_tombstone());
				Ok(AppendRequest {
					key: key.clone(),
					expected_version: current.map(|v| v.version_number).unwrap_or(0),
					payload: Some(value.clone()),
					change_kind: if live.is_some() {
						ChangeKind::Update
					} else {
						ChangeKind::Create
					},
					changed_by: actor.clone(),
					change_reason: reason.clone(),
					rollback_target: None,
					schema_version,
				})
			})
			.await?;

		self.notify(&version).await;
		self.audit_version(&version);
		info!(version = version.version_number, kind = %version.change_kind, "config version written");
		Ok(version)
	}

	/// Appends a delete tombstone. Resolution treats the layer as absent.
	#[instrument(skip(self, reason), fields(config_id = %key, actor = %actor))]
	pub async fn delete(
		&self,
		key: &ConfigKey,
		actor: &ActorId,
		reason: Option<String>,
	) -> Result<ConfigVersion> {
		let _scope = self.lock_scope(key).await;
		self.check_hold(key, None)?;

		let version = self
			.append_with_retry(key, |current| match current {
				Some(current) if !current.is_tombstone() => Ok(AppendRequest {
					key: key.clone(),
					expected_version: current.version_number,
					payload: None,
					change_kind: ChangeKind::Delete,
					changed_by: actor.clone(),
					change_reason: reason.clone(),
					rollback_target: None,
					schema_version: None,
				}),
				_ => Err(StoreError::NotFound(key.config_id())),
			})
			.await?;

		self.notify(&version).await;
		self.audit_version(&version);
		info!(version = version.version_number, "config entry deleted");
		Ok(version)
	}

	/// Appends a `Rollback` version whose payload is a copy of `target`.
	pub async fn rollback(
		&self,
		key: &ConfigKey,
		target: u64,
		actor: &ActorId,
		reason: Option<String>,
	) -> Result<ConfigVersion> {
		self.roll_back(key, target, actor, reason, None).await
	}

	/// Rolls back on behalf of the current holder of `key`.
	pub async fn rollback_held(
		&self,
		key: &ConfigKey,
		target: u64,
		actor: &ActorId,
		reason: Option<String>,
		holder: &str,
	) -> Result<ConfigVersion> {
		self.roll_back(key, target, actor, reason, Some(holder))
			.await
	}

	#[instrument(skip(self, reason), fields(config_id = %key, actor = %actor))]
	async fn roll_back(
		&self,
		key: &ConfigKey,
		target: u64,
		actor: &ActorId,
		reason: Option<String>,
		holder: Option<&str>,
	) -> Result<ConfigVersion> {
		let _scope = self.lock_scope(key).await;
		self.check_hold(key, holder)?;

		let target_version = self
			.durable
			.read_version(key, target)
			.await?
			.ok_or_else(|| StoreError::NotFound(format!("{} version {target}", key.config_id())))?;
		let payload = target_version.payload.ok_or_else(|| {
			StoreError::InvalidInput(format!("version {target} is a delete tombstone"))
		})?;

		let version = self
			.append_with_retry(key, |current| {
				let current = current.ok_or_else(|| StoreError::NotFound(key.config_id()))?;
				if current.version_number == target {
					return Err(StoreError::InvalidInput(format!(
						"version {target} is already current"
					)));
				}
				Ok(AppendRequest {
					key: key.clone(),
					expected_version: current.version_number,
					payload: Some(payload.clone()),
					change_kind: ChangeKind::Rollback,
					changed_by: actor.clone(),
					change_reason: reason.clone(),
					rollback_target: Some(target),
					schema_version: None,
				})
			})
			.await?;

		self.notify(&version).await;
		self.audit_version(&version);
		info!(version = version.version_number, target, "config entry rolled back");
		Ok(version)
	}

	/// Marks one version active or inactive without appending.
	#[instrument(skip(self), fields(config_id = %key))]
	pub async fn set_version_state(
		&self,
		key: &ConfigKey,
		version: u64,
		state: VersionState,
	) -> Result<()> {
		let _scope = self.lock_scope(key).await;

		self.durable.set_version_state(key, version, state).await?;
		self.notify_event(CommitEvent {
			key: key.clone(),
			version_number: version,
			change_kind: None,
		})
		.await;
		debug!(version, state = state.as_str(), "version state changed");
		Ok(())
	}

	/// Reserves `key` for `holder` and returns its current live version.
	///
	/// Re-acquiring by the same holder succeeds, so a restarted job can
	/// reclaim its hold.
	#[instrument(skip(self), fields(config_id = %key))]
	pub async fn acquire_hold(&self, key: &ConfigKey, holder: &str) -> Result<Option<ConfigVersion>> {
		let _scope = self.lock_scope(key).await;
		self.check_hold(key, Some(holder))?;
		self.holds.insert(key.clone(), holder.to_string());
		debug!(holder, "hold acquired");
		self.current(key).await
	}

	/// Releases the hold if `holder` owns it. Returns whether it did.
	pub async fn release_hold(&self, key: &ConfigKey, holder: &str) -> bool {
		let _scope = self.lock_scope(key).await;
		let released = self.holds.remove_if(key, |_, owner| owner == holder).is_some();
		if released {
			debug!(config_id = %key, holder, "hold released");
		}
		released
	}

	pub fn holder_of(&self, key: &ConfigKey) -> Option<String> {
		self.holds.get(key).map(|owner| owner.value().clone())
	}

	/// Current live version, or `None` if absent or deleted.
	pub async fn current(&self, key: &ConfigKey) -> Result<Option<ConfigVersion>> {
		Ok(self
			.durable
			.read_current(key)
			.await?
			.filter(|v| !v.is_tombstone()))
	}

	pub async fn read_version(&self, key: &ConfigKey, version: u64) -> Result<Option<ConfigVersion>> {
		self.durable.read_version(key, version).await
	}

	pub async fn entry(&self, key: &ConfigKey) -> Result<Option<ConfigEntry>> {
		self.durable.read_entry(key).await
	}

	/// Retained versions of `key`, oldest first.
	pub async fn history(&self, key: &ConfigKey) -> Result<Vec<ConfigVersion>> {
		self.durable.history(key).await
	}

	pub async fn list_entries(&self, tenant_id: &TenantId) -> Result<Vec<ConfigEntry>> {
		self.durable.list_entries(tenant_id).await
	}

	/// Drops the oldest versions of `key`, keeping `keep_latest` (or the
	/// configured retention) and always the current version.
	#[instrument(skip(self), fields(config_id = %key))]
	pub async fn prune(&self, key: &ConfigKey, keep_latest: Option<usize>) -> Result<Vec<u64>> {
		let keep = keep_latest.unwrap_or(self.config.retention_keep_latest);
		let _scope = self.lock_scope(key).await;

		let removed = self.durable.prune(key, keep).await?;
		if !removed.is_empty() {
			info!(removed = removed.len(), keep, "pruned config versions");
			self.emit(
				AuditLogEntry::builder(AuditEventType::ConfigPruned)
					.tenant(&key.tenant)
					.resource("config", key.config_id())
					.action("prune")
					.details(json!({ "removed_versions": removed, "keep_latest": keep }))
					.build(),
			);
		}
		Ok(removed)
	}

	/// Stored versions with a secret wrapped under `kek_id`.
	pub async fn find_by_kek(&self, kek_id: &KekId) -> Result<Vec<ConfigVersion>> {
		self.durable.find_by_kek(kek_id).await
	}

	/// Replaces a stored payload after its secrets were re-wrapped.
	///
	/// The caller guarantees the plaintext is unchanged, so resolved values
	/// stay valid and no commit event is raised.
	#[instrument(skip(self, payload), fields(config_id = %key))]
	pub async fn replace_rewrapped(
		&self,
		key: &ConfigKey,
		version: u64,
		payload: ConfigValue,
	) -> Result<()> {
		let _scope = self.lock_scope(key).await;
		self.durable.replace_payload(key, version, payload).await
	}

	async fn lock_scope(&self, key: &ConfigKey) -> ScopeGuard<'_> {
		let scope = key.scope();
		let lock = self
			.locks
			.entry(scope.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.value()
			.clone();
		ScopeGuard {
			locks: &self.locks,
			scope,
			guard: Some(lock.lock_owned().await),
		}
	}

	fn check_hold(&self, key: &ConfigKey, holder: Option<&str>) -> Result<()> {
		match self.holds.get(key) {
			Some(owner) if Some(owner.value().as_str()) != holder => Err(StoreError::Held {
				config_id: key.config_id(),
				holder: owner.value().clone(),
			}),
			_ => Ok(()),
		}
	}

	/// Builds and appends a version against the freshly read head.
	///
	/// A conflict means another writer advanced the head between read and
	/// append. The request is rebuilt from the new head and retried, up to the
	/// configured attempts.
	async fn append_with_retry<F>(&self, key: &ConfigKey, build: F) -> Result<ConfigVersion>
	where
		F: Fn(Option<&ConfigVersion>) -> Result<AppendRequest> + Send + Sync,
	{
		let attempts = self.config.write_retry_attempts.max(1);
		let mut attempt = 0;
		loop {
			attempt += 1;
			let current = self.durable.read_current(key).await?;
			let request = build(current.as_ref())?;
			if current.as_ref().map_or(true, |v| v.is_tombstone()) {
				self.check_entry_quota(&request).await?;
			}
			match self.durable.append_version(request).await {
				Ok(version) => return Ok(version),
				Err(StoreError::VersionConflict { actual, .. }) if attempt < attempts => {
					debug!(attempt, actual, "version conflict, retrying append");
				}
				Err(e) => return Err(e),
			}
		}
	}

	async fn check_entry_quota(&self, request: &AppendRequest) -> Result<()> {
		if request.payload.is_none() {
			return Ok(());
		}
		let tenant = &request.key.tenant;
		let live = self.durable.count_entries(tenant).await?;
		if live >= self.config.max_entries_per_tenant {
			return Err(self.quota_exceeded(
				&request.key,
				&request.changed_by,
				"max_entries_per_tenant",
				self.config.max_entries_per_tenant,
			));
		}
		Ok(())
	}

	fn quota_exceeded(
		&self,
		key: &ConfigKey,
		actor: &ActorId,
		limit: &'static str,
		max: usize,
	) -> StoreError {
		warn!(config_id = %key, limit, max, "tenant quota exceeded");
		self.emit(
			AuditLogEntry::builder(AuditEventType::QuotaExceeded)
				.outcome(AuditOutcome::Denied)
				.tenant(&key.tenant)
				.actor(actor)
				.resource("config", key.config_id())
				.action("write")
				.details(json!({ "limit": limit, "max": max }))
				.build(),
		);
		StoreError::QuotaExceeded { limit, max }
	}

	async fn notify(&self, version: &ConfigVersion) {
		self.notify_event(CommitEvent {
			key: version.config_id.clone(),
			version_number: version.version_number,
			change_kind: Some(version.change_kind),
		})
		.await;
	}

	async fn notify_event(&self, event: CommitEvent) {
		let listeners: Vec<Arc<dyn CommitListener>> = match self.listeners.read() {
			Ok(listeners) => listeners.clone(),
			Err(poisoned) => poisoned.into_inner().clone(),
		};
		for listener in listeners {
			listener.on_commit(&event).await;
		}
	}

	fn audit_version(&self, version: &ConfigVersion) {
		let secret = version
			.payload
			.as_ref()
			.is_some_and(ConfigValue::contains_secret);
		let event_type = match version.change_kind {
			ChangeKind::Create if secret => AuditEventType::SecretModified,
			ChangeKind::Update if secret => AuditEventType::SecretModified,
			ChangeKind::Create => AuditEventType::ConfigCreated,
			ChangeKind::Update => AuditEventType::ConfigUpdated,
			ChangeKind::Delete => AuditEventType::ConfigDeleted,
			ChangeKind::Rollback => AuditEventType::ConfigRolledBack,
		};
		self.emit(
			AuditLogEntry::builder(event_type)
				.tenant(&version.config_id.tenant)
				.actor(&version.changed_by)
				.resource("config", version.config_id.config_id())
				.action(version.change_kind.as_str())
				.details(json!({
					"version": version.version_number,
					"value_type": version.payload.as_ref().map(|p| p.value_type().as_str()),
					"rollback_target": version.rollback_target,
					"reason": version.change_reason,
				}))
				.build(),
		);
	}

	fn emit(&self, entry: AuditLogEntry) {
		if let Some(audit) = &self.audit {
			audit.log(entry);
		}
	}
}

/// Exclusive section of one scope. The scope's mutex is dropped from the
/// map once no other writer is holding or waiting on it.
struct ScopeGuard<'a> {
	locks: &'a DashMap<String, Arc<Mutex<()>>>,
	scope: String,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ScopeGuard<'_> {
	fn drop(&mut self) {
		self.guard.take();
		self.locks
			.remove_if(&self.scope, |_, lock| Arc::strong_count(lock) == 1);
	}
}
