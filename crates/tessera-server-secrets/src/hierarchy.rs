// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-tenant KEK lifecycle.
//!
//! Each tenant has exactly one Active KEK used for new wraps. Rotation creates
//! a new Active key, demotes the previous one to Deprecated and queues a
//! [`RewrapRequest`] so stored envelopes move to the new key in the background.
//! Deprecated keys keep unwrapping until their deletion grace period elapses.
//!
//! Key records are written through a [`TenantKeyStore`] before the in-memory
//! table changes, and [`KeyHierarchy::load`] restores them on startup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tessera_config_core::{KekId, KeyStatus, TenantId, TenantKey};
use tessera_server_audit::{AuditEventType, AuditLogEntry, AuditService};
use tessera_server_config::CryptoConfig;
use tessera_server_db::{InMemoryKeyStore, StoreError, TenantKeyStore};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult, KmsError};
use crate::kek_cache::KekCache;
use crate::kms::KeyManagementProvider;

const DEFAULT_KEK_CACHE_CAPACITY: usize = 1024;

/// Key operations needed by the [`EncryptionEngine`](crate::EncryptionEngine).
///
/// Implemented by [`KeyHierarchy`]; tests may substitute a fake.
#[async_trait]
pub trait KeyAccess: Send + Sync {
	async fn active_kek(&self, tenant_id: &TenantId) -> CryptoResult<KekId>;

	/// The tenant that owns `kek_id`, if the key is known.
	async fn owner_of(&self, kek_id: &KekId) -> Option<TenantId>;

	async fn wrap_dek(&self, kek_id: &KekId, dek: &[u8]) -> CryptoResult<Vec<u8>>;

	async fn unwrap_dek(&self, kek_id: &KekId, wrapped: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>>;
}

/// Counts stored envelopes whose DEK is still wrapped under a KEK.
#[async_trait]
pub trait WrappedKeyReferences: Send + Sync {
	async fn count_references(&self, kek_id: &KekId) -> Result<usize, String>;
}

/// Work item for the background re-wrap worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrapRequest {
	pub tenant_id: TenantId,
	pub from_kek: KekId,
	pub to_kek: KekId,
}

#[derive(Default)]
struct KeyTable {
	keys: HashMap<KekId, TenantKey>,
	active: HashMap<TenantId, KekId>,
}

pub struct KeyHierarchy {
	kms: Arc<dyn KeyManagementProvider>,
	records: Arc<dyn TenantKeyStore>,
	table: RwLock<KeyTable>,
	cache: Arc<KekCache>,
	/// Serializes provisioning, rotation and deletion scheduling.
	lifecycle: Mutex<()>,
	kms_timeout: Duration,
	deletion_grace: Duration,
	rewrap_tx: mpsc::UnboundedSender<RewrapRequest>,
	rewrap_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<RewrapRequest>>>,
	audit: Option<Arc<AuditService>>,
}

impl KeyHierarchy {
	pub fn new(kms: Arc<dyn KeyManagementProvider>, config: &CryptoConfig) -> Self {
		let cache = Arc::new(KekCache::new(
			DEFAULT_KEK_CACHE_CAPACITY,
			config.kek_cache_ttl(),
		));
		let (rewrap_tx, rewrap_rx) = mpsc::unbounded_channel();
		Self {
			kms,
			records: Arc::new(InMemoryKeyStore::new()),
			table: RwLock::new(KeyTable::default()),
			cache,
			lifecycle: Mutex::new(()),
			kms_timeout: config.kms_timeout(),
			deletion_grace: config.kek_deletion_grace(),
			rewrap_tx,
			rewrap_rx: std::sync::Mutex::new(Some(rewrap_rx)),
			audit: None,
		}
	}

	/// Persists key records in `records` instead of process memory.
	pub fn with_key_store(mut self, records: Arc<dyn TenantKeyStore>) -> Self {
		self.records = records;
		self
	}

	/// Replaces the active-KEK lookup cache.
	pub fn with_cache(mut self, cache: Arc<KekCache>) -> Self {
		self.cache = cache;
		self
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	pub fn cache(&self) -> &Arc<KekCache> {
		&self.cache
	}

	/// Hands out the receiving end of the re-wrap queue. Returns `None` after
	/// the first call.
	pub fn take_rewrap_receiver(&self) -> Option<mpsc::UnboundedReceiver<RewrapRequest>> {
		match self.rewrap_rx.lock() {
			Ok(mut rx) => rx.take(),
			Err(poisoned) => poisoned.into_inner().take(),
		}
	}

	/// Reads every stored key record into the in-memory table.
	///
	/// Must run before the hierarchy serves requests, or tenants whose keys
	/// were created by an earlier process get a fresh KEK. If a crash left two
	/// Active keys for one tenant, the newest stays Active and the others are
	/// demoted. Returns the number of records loaded.
	#[instrument(skip(self))]
	pub async fn load(&self) -> CryptoResult<usize> {
		let _guard = self.lifecycle.lock().await;
		let records = self.records.load_keys().await.map_err(key_store_error)?;
		let loaded = records.len();

		let mut demoted = Vec::new();
		{
			let mut table = self.table.write().await;
			for key in records {
				if key.status == KeyStatus::Active {
					if let Some(previous) = table.active.insert(key.tenant_id.clone(), key.kek_id.clone())
					{
						if let Some(old) = table.keys.get_mut(&previous) {
							old.status = KeyStatus::Deprecated;
							old.deprecated_at.get_or_insert_with(Utc::now);
							demoted.push(old.clone());
						}
					}
				}
				table.keys.insert(key.kek_id.clone(), key);
			}
		}
		for key in &demoted {
			warn!(kek_id = %key.kek_id, tenant_id = %key.tenant_id, "demoting superseded active KEK");
			self.records.save_key(key).await.map_err(key_store_error)?;
		}
		self.cache.clear();

		info!(loaded, "tenant key records loaded");
		Ok(loaded)
	}

	/// Returns the tenant's Active KEK, provisioning one on first use.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn active_kek(&self, tenant_id: &TenantId) -> CryptoResult<KekId> {
		if let Some(kek_id) = self.cache.get(tenant_id) {
			return Ok(kek_id);
		}
		if let Some(kek_id) = self.table.read().await.active.get(tenant_id).cloned() {
			self.cache.insert(tenant_id.clone(), kek_id.clone());
			return Ok(kek_id);
		}
		self.provision_tenant(tenant_id).await
	}

	/// Creates the tenant's first KEK. Idempotent.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn provision_tenant(&self, tenant_id: &TenantId) -> CryptoResult<KekId> {
		let _guard = self.lifecycle.lock().await;

		if let Some(kek_id) = self.table.read().await.active.get(tenant_id).cloned() {
			return Ok(kek_id);
		}

		let kek_id = self
			.call_kms("create_key", self.kms.create_key(tenant_id))
			.await?;
		let record = TenantKey::new_active(tenant_id.clone(), kek_id.clone());
		self.records.save_key(&record).await.map_err(key_store_error)?;

		{
			let mut table = self.table.write().await;
			table.keys.insert(kek_id.clone(), record);
			table.active.insert(tenant_id.clone(), kek_id.clone());
		}
		self.cache.insert(tenant_id.clone(), kek_id.clone());

		info!(kek_id = %kek_id, "provisioned tenant KEK");
		self.emit(
			AuditLogEntry::builder(AuditEventType::KekCreated)
				.tenant(tenant_id)
				.resource("kek", kek_id.as_str())
				.action("provision")
				.build(),
		);
		Ok(kek_id)
	}

	/// Creates a new Active KEK and demotes the previous one to Deprecated.
	///
	/// Re-wrapping of existing envelopes is queued, not awaited.
	#[instrument(skip(self), fields(tenant_id = %tenant_id))]
	pub async fn rotate_kek(&self, tenant_id: &TenantId) -> CryptoResult<KekId> {
		let _guard = self.lifecycle.lock().await;

		let new_kek = self
			.call_kms("create_key", self.kms.create_key(tenant_id))
			.await?;
		let record = TenantKey::new_active(tenant_id.clone(), new_kek.clone());

		// The new record lands first; `load` demotes an older Active key left
		// behind if the demotion below never reaches the store.
		self.records.save_key(&record).await.map_err(key_store_error)?;
		let previous = self.table.read().await.active.get(tenant_id).cloned();
		let demoted = match &previous {
			Some(old_id) => self.table.read().await.keys.get(old_id).cloned().map(|mut old| {
				old.status = KeyStatus::Deprecated;
				old.deprecated_at = Some(Utc::now());
				old
			}),
			None => None,
		};
		if let Some(old) = &demoted {
			self.records.save_key(old).await.map_err(key_store_error)?;
		}

		{
			let mut table = self.table.write().await;
			if let Some(old) = demoted {
				table.keys.insert(old.kek_id.clone(), old);
			}
			table.keys.insert(new_kek.clone(), record);
			table.active.insert(tenant_id.clone(), new_kek.clone());
		}
		self.cache.insert(tenant_id.clone(), new_kek.clone());

		if let Some(from_kek) = previous.clone() {
			let request = RewrapRequest {
				tenant_id: tenant_id.clone(),
				from_kek,
				to_kek: new_kek.clone(),
			};
			if self.rewrap_tx.send(request).is_err() {
				debug!("re-wrap worker not running; deprecated key stays in use for unwrap");
			}
		}

		info!(
			new_kek = %new_kek,
			previous_kek = previous.as_ref().map(KekId::as_str),
			"rotated tenant KEK"
		);
		self.emit(
			AuditLogEntry::builder(AuditEventType::KekRotated)
				.tenant(tenant_id)
				.resource("kek", new_kek.as_str())
				.action("rotate")
				.details(json!({
					"previous_kek": previous.as_ref().map(KekId::as_str),
				}))
				.build(),
		);
		Ok(new_kek)
	}

	/// Schedules a non-active KEK for destruction after the grace period.
	///
	/// Refused while any stored envelope still wraps its DEK under the key.
	#[instrument(skip(self, references), fields(kek_id = %kek_id))]
	pub async fn schedule_deletion(
		&self,
		kek_id: &KekId,
		references: &dyn WrappedKeyReferences,
	) -> CryptoResult<DateTime<Utc>> {
		let _guard = self.lifecycle.lock().await;

		let key = self
			.table
			.read()
			.await
			.keys
			.get(kek_id)
			.cloned()
			.ok_or_else(|| CryptoError::UnknownKey(kek_id.clone()))?;
		if key.status == KeyStatus::Active {
			return Err(CryptoError::KeyActive(kek_id.clone()));
		}
		if let Some(due) = key.deletion_due_at {
			return Ok(due);
		}

		let outstanding = references
			.count_references(kek_id)
			.await
			.map_err(CryptoError::Internal)?;
		if outstanding > 0 {
			warn!(outstanding, "refusing to delete KEK with outstanding wrapped DEKs");
			return Err(CryptoError::KeyStillReferenced {
				kek_id: kek_id.clone(),
				references: outstanding,
			});
		}

		let due = self
			.call_kms(
				"schedule_deletion",
				self.kms.schedule_deletion(kek_id, self.deletion_grace),
			)
			.await?;

		let mut pending = key.clone();
		pending.status = KeyStatus::PendingDeletion;
		pending.deletion_due_at = Some(due);
		self.records.save_key(&pending).await.map_err(key_store_error)?;
		self.table
			.write()
			.await
			.keys
			.insert(kek_id.clone(), pending);

		info!(due = %due, "scheduled KEK deletion");
		self.emit(
			AuditLogEntry::builder(AuditEventType::KekDeletionScheduled)
				.tenant(&key.tenant_id)
				.resource("kek", kek_id.as_str())
				.action("schedule_deletion")
				.details(json!({ "deletion_due_at": due.to_rfc3339() }))
				.build(),
		);
		Ok(due)
	}

	/// All keys of a tenant, oldest first.
	pub async fn keys_for(&self, tenant_id: &TenantId) -> Vec<TenantKey> {
		let mut keys: Vec<TenantKey> = self
			.table
			.read()
			.await
			.keys
			.values()
			.filter(|k| &k.tenant_id == tenant_id)
			.cloned()
			.collect();
		keys.sort_by_key(|k| k.created_at);
		keys
	}

	pub async fn key(&self, kek_id: &KekId) -> Option<TenantKey> {
		self.table.read().await.keys.get(kek_id).cloned()
	}

	/// Drops records of keys whose deletion deadline has passed.
	pub async fn purge_destroyed(&self, now: DateTime<Utc>) -> CryptoResult<Vec<KekId>> {
		let _guard = self.lifecycle.lock().await;
		let destroyed: Vec<KekId> = self
			.table
			.read()
			.await
			.keys
			.values()
			.filter(|k| k.status == KeyStatus::PendingDeletion && !k.usable_for_unwrap(now))
			.map(|k| k.kek_id.clone())
			.collect();
		for kek_id in &destroyed {
			self.records.remove_key(kek_id).await.map_err(key_store_error)?;
			self.table.write().await.keys.remove(kek_id);
		}
		if !destroyed.is_empty() {
			info!(count = destroyed.len(), "purged destroyed KEK records");
		}
		Ok(destroyed)
	}

	async fn call_kms<T, F>(&self, operation: &'static str, call: F) -> CryptoResult<T>
	where
		F: Future<Output = Result<T, KmsError>>,
	{
		match tokio::time::timeout(self.kms_timeout, call).await {
			Ok(result) => result.map_err(CryptoError::from),
			Err(_) => {
				warn!(
					operation,
					timeout_ms = self.kms_timeout.as_millis() as u64,
					provider = self.kms.name(),
					"key management call timed out"
				);
				Err(CryptoError::KeyUnavailable(format!(
					"{operation} timed out after {}ms",
					self.kms_timeout.as_millis()
				)))
			}
		}
	}

	fn emit(&self, entry: AuditLogEntry) {
		if let Some(audit) = &self.audit {
			audit.log(entry);
		}
	}
}

fn key_store_error(e: StoreError) -> CryptoError {
	CryptoError::Internal(format!("key record store: {e}"))
}

#[async_trait]
impl KeyAccess for KeyHierarchy {
	async fn active_kek(&self, tenant_id: &TenantId) -> CryptoResult<KekId> {
		KeyHierarchy::active_kek(self, tenant_id).await
	}

	async fn owner_of(&self, kek_id: &KekId) -> Option<TenantId> {
		self.table
			.read()
			.await
			.keys
			.get(kek_id)
			.map(|k| k.tenant_id.clone())
	}

	async fn wrap_dek(&self, kek_id: &KekId, dek: &[u8]) -> CryptoResult<Vec<u8>> {
		self.call_kms("wrap", self.kms.wrap(kek_id, dek)).await
	}

	async fn unwrap_dek(&self, kek_id: &KekId, wrapped: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
		let usable = self
			.table
			.read()
			.await
			.keys
			.get(kek_id)
			.map(|k| k.usable_for_unwrap(Utc::now()));
		match usable {
			None => return Err(CryptoError::UnknownKey(kek_id.clone())),
			Some(false) => {
				return Err(CryptoError::KeyUnavailable(format!(
					"key {kek_id} has been destroyed"
				)))
			}
			Some(true) => {}
		}
		self.call_kms("unwrap", self.kms.unwrap(kek_id, wrapped)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kms::LocalKms;
	use tessera_server_audit::MemoryAuditSink;

	struct FixedReferences(usize);

	#[async_trait]
	impl WrappedKeyReferences for FixedReferences {
		async fn count_references(&self, _kek_id: &KekId) -> Result<usize, String> {
			Ok(self.0)
		}
	}

	fn hierarchy(kms: Arc<LocalKms>) -> KeyHierarchy {
		KeyHierarchy::new(kms, &CryptoConfig::default())
	}

	#[tokio::test]
	async fn active_kek_provisions_once() {
		let kms = Arc::new(LocalKms::new());
		let keys = hierarchy(kms.clone());
		let tenant = TenantId::new("t1");

		let first = keys.active_kek(&tenant).await.unwrap();
		let second = keys.active_kek(&tenant).await.unwrap();
		assert_eq!(first, second);
		assert_eq!(keys.keys_for(&tenant).await.len(), 1);
		assert_eq!(KeyAccess::owner_of(&keys, &first).await, Some(tenant));
	}

	#[tokio::test]
	async fn tenants_get_distinct_keys() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let a = keys.active_kek(&TenantId::new("a")).await.unwrap();
		let b = keys.active_kek(&TenantId::new("b")).await.unwrap();
		assert_ne!(a, b);
	}

	#[tokio::test]
	async fn rotation_demotes_previous_and_queues_rewrap() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let tenant = TenantId::new("t1");
		let mut rewraps = keys.take_rewrap_receiver().unwrap();

		let old = keys.active_kek(&tenant).await.unwrap();
		let new = keys.rotate_kek(&tenant).await.unwrap();

		assert_ne!(old, new);
		assert_eq!(keys.active_kek(&tenant).await.unwrap(), new);
		assert_eq!(keys.key(&old).await.unwrap().status, KeyStatus::Deprecated);
		assert_eq!(keys.key(&new).await.unwrap().status, KeyStatus::Active);

		let request = rewraps.recv().await.unwrap();
		assert_eq!(
			request,
			RewrapRequest {
				tenant_id: tenant,
				from_kek: old,
				to_kek: new,
			}
		);
	}

	#[tokio::test]
	async fn deprecated_key_still_unwraps() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let tenant = TenantId::new("t1");
		let old = keys.active_kek(&tenant).await.unwrap();
		let wrapped = keys.wrap_dek(&old, &[9u8; 32]).await.unwrap();

		keys.rotate_kek(&tenant).await.unwrap();
		let dek = keys.unwrap_dek(&old, &wrapped).await.unwrap();
		assert_eq!(dek.as_slice(), &[9u8; 32]);
	}

	#[tokio::test]
	async fn deletion_refused_for_active_key() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let kek = keys.active_kek(&TenantId::new("t1")).await.unwrap();
		let result = keys.schedule_deletion(&kek, &FixedReferences(0)).await;
		assert!(matches!(result, Err(CryptoError::KeyActive(_))));
	}

	#[tokio::test]
	async fn deletion_refused_while_referenced() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let tenant = TenantId::new("t1");
		let old = keys.active_kek(&tenant).await.unwrap();
		keys.rotate_kek(&tenant).await.unwrap();

		let result = keys.schedule_deletion(&old, &FixedReferences(3)).await;
		assert!(matches!(
			result,
			Err(CryptoError::KeyStillReferenced { references: 3, .. })
		));
		assert_eq!(keys.key(&old).await.unwrap().status, KeyStatus::Deprecated);
	}

	#[tokio::test]
	async fn deletion_uses_default_grace_period() {
		let keys = hierarchy(Arc::new(LocalKms::new()));
		let tenant = TenantId::new("t1");
		let old = keys.active_kek(&tenant).await.unwrap();
		keys.rotate_kek(&tenant).await.unwrap();

		let before = Utc::now();
		let due = keys
			.schedule_deletion(&old, &FixedReferences(0))
			.await
			.unwrap();
		assert!(due >= before + chrono::Duration::days(7) - chrono::Duration::seconds(1));

		let record = keys.key(&old).await.unwrap();
		assert_eq!(record.status, KeyStatus::PendingDeletion);
		assert!(keys.purge_destroyed(Utc::now()).await.unwrap().is_empty());
		assert_eq!(keys.purge_destroyed(due).await.unwrap(), vec![old]);
	}

	#[tokio::test]
	async fn unwrap_after_deadline_is_unavailable() {
		let config = CryptoConfig {
			kek_deletion_grace_secs: 0,
			..Default::default()
		};
		let keys = KeyHierarchy::new(Arc::new(LocalKms::new()), &config);
		let tenant = TenantId::new("t1");
		let old = keys.active_kek(&tenant).await.unwrap();
		let wrapped = keys.wrap_dek(&old, &[1u8; 32]).await.unwrap();
		keys.rotate_kek(&tenant).await.unwrap();
		keys.schedule_deletion(&old, &FixedReferences(0))
			.await
			.unwrap();

		let result = keys.unwrap_dek(&old, &wrapped).await;
		assert!(matches!(result, Err(CryptoError::KeyUnavailable(_))));
	}

	#[tokio::test]
	async fn slow_kms_times_out_as_key_unavailable() {
		let kms = Arc::new(LocalKms::new());
		let config = CryptoConfig {
			kms_timeout_ms: 20,
			..Default::default()
		};
		let keys = KeyHierarchy::new(kms.clone(), &config);
		let tenant = TenantId::new("t1");
		let kek = keys.active_kek(&tenant).await.unwrap();

		kms.set_latency(Duration::from_millis(200));
		let err = keys.wrap_dek(&kek, &[0u8; 32]).await.unwrap_err();
		assert!(matches!(err, CryptoError::KeyUnavailable(_)));
		assert!(err.kind().is_retryable());
	}

	#[tokio::test]
	async fn rotation_is_audited() {
		let sink = Arc::new(MemoryAuditSink::new());
		let audit = Arc::new(AuditService::with_sink(sink.clone()));
		let keys = hierarchy(Arc::new(LocalKms::new())).with_audit(audit);
		let tenant = TenantId::new("t1");

		keys.active_kek(&tenant).await.unwrap();
		keys.rotate_kek(&tenant).await.unwrap();

		let events = sink
			.wait_for(AuditEventType::KekRotated, 1, Duration::from_secs(1))
			.await;
		assert_eq!(events[0].tenant_id.as_deref(), Some("t1"));
		assert_eq!(sink.events_of(AuditEventType::KekCreated).len(), 1);
	}

	#[tokio::test]
	async fn restarted_hierarchy_keeps_ownership_and_lifecycle() {
		let kms = Arc::new(LocalKms::new());
		let records: Arc<dyn TenantKeyStore> = Arc::new(InMemoryKeyStore::new());
		let tenant = TenantId::new("t1");

		let first = hierarchy(kms.clone()).with_key_store(Arc::clone(&records));
		let old = first.active_kek(&tenant).await.unwrap();
		let wrapped = first.wrap_dek(&old, &[7u8; 32]).await.unwrap();
		let new = first.rotate_kek(&tenant).await.unwrap();
		drop(first);

		let second = hierarchy(kms).with_key_store(records);
		assert_eq!(second.load().await.unwrap(), 2);

		assert_eq!(second.active_kek(&tenant).await.unwrap(), new);
		assert_eq!(second.keys_for(&tenant).await.len(), 2);
		assert_eq!(second.key(&old).await.unwrap().status, KeyStatus::Deprecated);
		assert_eq!(KeyAccess::owner_of(&second, &old).await, Some(tenant));
		let dek = second.unwrap_dek(&old, &wrapped).await.unwrap();
		assert_eq!(dek.as_slice(), &[7u8; 32]);
	}

	#[tokio::test]
	async fn load_demotes_an_active_key_left_by_an_interrupted_rotation() {
		let records = Arc::new(InMemoryKeyStore::new());
		let tenant = TenantId::new("t1");
		let mut older = TenantKey::new_active(tenant.clone(), KekId::new("k-old"));
		older.created_at -= chrono::Duration::minutes(5);
		let newer = TenantKey::new_active(tenant.clone(), KekId::new("k-new"));
		records.save_key(&older).await.unwrap();
		records.save_key(&newer).await.unwrap();

		let keys = hierarchy(Arc::new(LocalKms::new())).with_key_store(records.clone());
		keys.load().await.unwrap();

		assert_eq!(keys.active_kek(&tenant).await.unwrap(), newer.kek_id);
		let stored = records.load_keys().await.unwrap();
		assert_eq!(stored[0].kek_id, older.kek_id);
		assert_eq!(stored[0].status, KeyStatus::Deprecated);
	}

	#[tokio::test]
	async fn deletion_and_purge_reach_the_record_store() {
		let config = CryptoConfig {
			kek_deletion_grace_secs: 0,
			..Default::default()
		};
		let records = Arc::new(InMemoryKeyStore::new());
		let keys = KeyHierarchy::new(Arc::new(LocalKms::new()), &config)
			.with_key_store(records.clone());
		let tenant = TenantId::new("t1");
		let old = keys.active_kek(&tenant).await.unwrap();
		keys.rotate_kek(&tenant).await.unwrap();
		let due = keys
			.schedule_deletion(&old, &FixedReferences(0))
			.await
			.unwrap();

		let stored = records.load_keys().await.unwrap();
		let record = stored.iter().find(|k| k.kek_id == old).unwrap();
		assert_eq!(record.status, KeyStatus::PendingDeletion);
		assert_eq!(record.deletion_due_at, Some(due));

		assert_eq!(keys.purge_destroyed(due).await.unwrap(), vec![old]);
		assert_eq!(records.load_keys().await.unwrap().len(), 1);
	}
}
