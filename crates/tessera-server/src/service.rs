// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorized read and write paths over the configuration core.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tessera_config_core::{
	ActorId, ConfigEntry, ConfigKey, ConfigValue, ConfigVersion, Environment, KekId, TenantId,
	TenantKey, ValueType,
};
use tessera_server_audit::{AuditEventType, AuditLogBuilder, AuditLogEntry, AuditService};
use tessera_server_auth::{Action, AuthContext, AuthorizationGate, Resource};
use tessera_server_cache::CacheLayer;
use tessera_server_db::VersionStore;
use tessera_server_resolve::Resolution;
use tessera_server_rotation::{RotationError, RotationJob, RotationManager, SecretClass};
use tessera_server_secrets::{CryptoError, EncryptionEngine, KeyHierarchy};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::rewrap::StoreKeyReferences;

/// Options for a write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
	pub reason: Option<String>,
	/// Schema the value must satisfy when resolved.
	pub schema_version: Option<u32>,
	/// Schedules a rotation of the written secret in this class.
	pub rotation: Option<SecretClass>,
}

impl WriteOptions {
	pub fn reason(reason: impl Into<String>) -> Self {
		Self {
			reason: Some(reason.into()),
			..Self::default()
		}
	}
}

/// Result of a write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
	pub version: ConfigVersion,
	pub rotation: Option<RotationJob>,
}

/// Entry point for every configuration and secret operation.
///
/// Each operation is checked by the [`AuthorizationGate`] before it touches
/// storage. Reads are served through the [`CacheLayer`]; writes append a
/// version to the [`VersionStore`], whose commit listeners invalidate the
/// cache before the write returns.
pub struct ConfigService {
	store: Arc<VersionStore>,
	cache: Arc<CacheLayer>,
	gate: Arc<AuthorizationGate>,
	encryption: Arc<EncryptionEngine>,
	keys: Arc<KeyHierarchy>,
	rotation: Arc<RotationManager>,
	audit: Option<Arc<AuditService>>,
}

impl ConfigService {
	pub fn new(
		store: Arc<VersionStore>,
		cache: Arc<CacheLayer>,
		gate: Arc<AuthorizationGate>,
		encryption: Arc<EncryptionEngine>,
		keys: Arc<KeyHierarchy>,
		rotation: Arc<RotationManager>,
	) -> Self {
		Self {
			store,
			cache,
			gate,
			encryption,
			keys,
			rotation,
			audit: None,
		}
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	/// Resolves the effective value of `key`.
	///
	/// Values containing a secret additionally require read access to the
	/// secret resource, so a config-only reader never sees plaintext. The
	/// check runs before resolution when any layer stores a secret, so a
	/// denied read decrypts nothing. Secrets pulled in through references are
	/// checked once resolved.
	#[instrument(skip(self, context), fields(actor = %actor, config_id = %key))]
	pub async fn get(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		context: &AuthContext,
	) -> Result<Arc<Resolution>> {
		self.validate(key)?;
		self.gate
			.check(actor, &Resource::config(key), Action::Read, context)
			.await?;

		let layered_secret = self.layers_hold_secret(key).await?;
		if layered_secret {
			self.gate
				.check(actor, &Resource::secret(key), Action::Read, context)
				.await?;
		}

		let resolution = self.cache.get(key).await?;
		let secret = resolution.value.contains_secret();
		if secret && !layered_secret {
			self.gate
				.check(actor, &Resource::secret(key), Action::Read, context)
				.await?;
		}

		let event = if secret {
			AuditEventType::SecretAccessed
		} else {
			AuditEventType::ConfigAccessed
		};
		self.emit(
			AuditLogEntry::builder(event)
				.tenant(&key.tenant)
				.actor(actor)
				.resource(if secret { "secret" } else { "config" }, key.config_id())
				.action("read")
				.details(json!({ "layers": resolution.layers })),
			context,
		);
		Ok(resolution)
	}

	/// Writes `value` as the next version of `key`.
	#[instrument(skip(self, value, options, context), fields(actor = %actor, config_id = %key))]
	pub async fn put(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		value: ConfigValue,
		options: WriteOptions,
		context: &AuthContext,
	) -> Result<WriteOutcome> {
		self.validate(key)?;
		if options.rotation.is_some() && !matches!(value, ConfigValue::Secret(_)) {
			return Err(ServiceError::InvalidInput(
				"rotation applies to secret values only".to_string(),
			));
		}

		let resource = self.resource_for(key, Some(&value)).await?;
		self.gate
			.check(actor, &resource, Action::Write, context)
			.await?;
		if options.rotation.is_some() {
			self.gate
				.check(actor, &Resource::secret(key), Action::Rotate, context)
				.await?;
		}
		self.ensure_not_rotating(key)?;

		let version = self
			.store
			.put_with_schema(key, value, options.schema_version, actor, options.reason)
			.await?;
		debug!(version = version.version_number, "config written");

		let rotation = match options.rotation {
			Some(class) => Some(self.rotation.schedule(key, class, actor).await?),
			None => None,
		};
		Ok(WriteOutcome { version, rotation })
	}

	/// Encrypts `plaintext` under the tenant's active KEK and writes it.
	#[instrument(skip(self, plaintext, options, context), fields(actor = %actor, config_id = %key))]
	pub async fn put_secret(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		plaintext: &[u8],
		options: WriteOptions,
		context: &AuthContext,
	) -> Result<WriteOutcome> {
		self.validate(key)?;
		// Checked before encrypting so a denied caller never reaches the KMS.
		self.gate
			.check(actor, &Resource::secret(key), Action::Write, context)
			.await?;
		let payload = self.encryption.encrypt(plaintext, &key.tenant).await?;
		self.put(actor, key, ConfigValue::Secret(payload), options, context)
			.await
	}

	/// Appends a delete tombstone for `key`.
	#[instrument(skip(self, reason, context), fields(actor = %actor, config_id = %key))]
	pub async fn delete(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		reason: Option<String>,
		context: &AuthContext,
	) -> Result<ConfigVersion> {
		self.validate(key)?;
		let resource = self.resource_for(key, None).await?;
		self.gate
			.check(actor, &resource, Action::Delete, context)
			.await?;
		self.ensure_not_rotating(key)?;
		Ok(self.store.delete(key, actor, reason).await?)
	}

	/// Appends a copy of version `target` as the current version.
	#[instrument(skip(self, reason, context), fields(actor = %actor, config_id = %key))]
	pub async fn rollback(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		target: u64,
		reason: Option<String>,
		context: &AuthContext,
	) -> Result<ConfigVersion> {
		self.validate(key)?;
		let resource = self.resource_for(key, None).await?;
		self.gate
			.check(actor, &resource, Action::Rollback, context)
			.await?;
		self.ensure_not_rotating(key)?;
		Ok(self.store.rollback(key, target, actor, reason).await?)
	}

	/// Every stored version of `key`, oldest first. Secrets stay encrypted.
	pub async fn history(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		context: &AuthContext,
	) -> Result<Vec<ConfigVersion>> {
		self.validate(key)?;
		self.gate
			.check(actor, &Resource::config(key), Action::Read, context)
			.await?;
		Ok(self.store.history(key).await?)
	}

	pub async fn schedule_rotation(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		class: SecretClass,
		context: &AuthContext,
	) -> Result<RotationJob> {
		self.validate(key)?;
		self.gate
			.check(actor, &Resource::secret(key), Action::Rotate, context)
			.await?;
		Ok(self.rotation.schedule(key, class, actor).await?)
	}

	/// Stops a rotation job, restoring the previous value if one was written.
	pub async fn abort_rotation(
		&self,
		actor: &ActorId,
		job_id: Uuid,
		reason: &str,
		context: &AuthContext,
	) -> Result<RotationJob> {
		let job = self.rotation.job(job_id).await?;
		self.gate
			.check(actor, &Resource::secret(&job.secret), Action::Rotate, context)
			.await?;
		Ok(self.rotation.abort(job_id, actor, reason).await?)
	}

	pub async fn rotation_jobs(
		&self,
		actor: &ActorId,
		key: &ConfigKey,
		context: &AuthContext,
	) -> Result<Vec<RotationJob>> {
		self.gate
			.check(actor, &Resource::secret(key), Action::Read, context)
			.await?;
		Ok(self.rotation.jobs_for(key).await?)
	}

	/// Rotates the tenant's KEK. Stored envelopes are re-wrapped in the
	/// background.
	pub async fn rotate_tenant_key(
		&self,
		actor: &ActorId,
		tenant: &TenantId,
		context: &AuthContext,
	) -> Result<KekId> {
		self.gate
			.check(actor, &Resource::keys(tenant), Action::ManageKeys, context)
			.await?;
		Ok(self.keys.rotate_kek(tenant).await?)
	}

	pub async fn tenant_keys(
		&self,
		actor: &ActorId,
		tenant: &TenantId,
		context: &AuthContext,
	) -> Result<Vec<TenantKey>> {
		self.gate
			.check(actor, &Resource::keys(tenant), Action::Read, context)
			.await?;
		Ok(self.keys.keys_for(tenant).await)
	}

	/// Schedules deletion of a deprecated KEK. Refused while any stored
	/// envelope is still wrapped under it.
	pub async fn schedule_key_deletion(
		&self,
		actor: &ActorId,
		tenant: &TenantId,
		kek_id: &KekId,
		context: &AuthContext,
	) -> Result<DateTime<Utc>> {
		self.gate
			.check(actor, &Resource::keys(tenant), Action::ManageKeys, context)
			.await?;
		let key = self
			.keys
			.key(kek_id)
			.await
			.ok_or_else(|| CryptoError::UnknownKey(kek_id.clone()))?;
		if &key.tenant_id != tenant {
			return Err(CryptoError::TenantIsolationViolation {
				tenant: tenant.clone(),
			}
			.into());
		}
		let references = StoreKeyReferences::new(Arc::clone(&self.store));
		Ok(self.keys.schedule_deletion(kek_id, &references).await?)
	}

	/// Live entries of `tenant` the actor may read, narrowed to one namespace
	/// or environment when given. Entries the actor cannot read are left out.
	#[instrument(skip(self, context), fields(actor = %actor, tenant = %tenant))]
	pub async fn list(
		&self,
		actor: &ActorId,
		tenant: &TenantId,
		namespace: Option<&str>,
		environment: Option<Environment>,
		context: &AuthContext,
	) -> Result<Vec<ConfigEntry>> {
		if !tenant.is_valid() {
			return Err(ServiceError::InvalidInput(format!("invalid tenant id: {tenant}")));
		}

		let mut visible = Vec::new();
		for entry in self.store.list_entries(tenant).await? {
			if entry.deleted
				|| namespace.is_some_and(|ns| entry.key.namespace != ns)
				|| environment.is_some_and(|env| entry.key.environment != env)
			{
				continue;
			}
			let decision = self
				.gate
				.decide(actor, &Resource::config(&entry.key), Action::Read, context)
				.await?;
			if decision.allowed {
				visible.push(entry);
			}
		}
		debug!(count = visible.len(), "listed entries");
		Ok(visible)
	}

	fn validate(&self, key: &ConfigKey) -> Result<()> {
		key.validate().map_err(ServiceError::InvalidInput)
	}

	fn ensure_not_rotating(&self, key: &ConfigKey) -> Result<()> {
		if self.rotation.is_rotating(key) {
			return Err(RotationError::InProgress(key.config_id()).into());
		}
		Ok(())
	}

	/// Whether any environment layer `key` resolves through currently stores
	/// a secret.
	async fn layers_hold_secret(&self, key: &ConfigKey) -> Result<bool> {
		for environment in key.environment.precedence_chain() {
			let layer = self.store.current(&key.with_environment(environment)).await?;
			if layer
				.and_then(|v| v.payload)
				.is_some_and(|payload| payload.contains_secret())
			{
				return Ok(true);
			}
		}
		Ok(false)
	}

	/// Secret resource if the incoming or stored value is a secret.
	async fn resource_for(&self, key: &ConfigKey, incoming: Option<&ConfigValue>) -> Result<Resource> {
		if incoming.is_some_and(ConfigValue::contains_secret) {
			return Ok(Resource::secret(key));
		}
		let stored_secret = self
			.store
			.entry(key)
			.await?
			.is_some_and(|entry| entry.value_type == ValueType::SecretReference);
		Ok(if stored_secret {
			Resource::secret(key)
		} else {
			Resource::config(key)
		})
	}

	fn emit(&self, builder: AuditLogBuilder, context: &AuthContext) {
		if let Some(audit) = &self.audit {
			let builder = match &context.request_id {
				Some(id) => builder.request_id(id.clone()),
				None => builder,
			};
			audit.log(builder.build());
		}
	}
}
