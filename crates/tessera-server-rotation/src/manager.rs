// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde_json::json;
use tessera_config_core::{ActorId, ChangeKind, ConfigKey, ConfigValue, ConfigVersion, VersionState};
use tessera_server_audit::{AuditEventType, AuditLogEntry, AuditOutcome, AuditService};
use tessera_server_cache::{CacheLayer, InvalidationPattern};
use tessera_server_config::RotationConfig;
use tessera_server_db::{StoreError, VersionStore};
use tessera_server_secrets::EncryptionEngine;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::collaborators::{HealthCheck, HealthSignal, RotationNotifier, SecretGenerator, TracingNotifier};
use crate::error::{Result, RotationError};
use crate::job::{RotationJob, RotationPhase, SecretClass};
use crate::store::RotationJobStore;

/// Upper bound for one consumer health check. A timeout counts as unhealthy.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives rotation jobs through their phases.
///
/// Every phase performs its side effects before the job is saved in the next
/// phase, and each side effect can be repeated safely. A job interrupted by a
/// crash is resumed by [`RotationManager::recover`] and re-enters the phase it
/// had reached.
///
/// From `Generating` until a terminal phase the job holds the secret in the
/// [`VersionStore`]: other rotations fail with [`RotationError::InProgress`]
/// instead of waiting, and writes by anyone but the job are refused.
pub struct RotationManager {
	store: Arc<VersionStore>,
	encryption: Arc<EncryptionEngine>,
	jobs: Arc<dyn RotationJobStore>,
	generator: Arc<dyn SecretGenerator>,
	health_checks: Vec<Arc<dyn HealthCheck>>,
	notifier: Arc<dyn RotationNotifier>,
	cache: Option<Arc<CacheLayer>>,
	audit: Option<Arc<AuditService>>,
	config: RotationConfig,
	/// Serializes `run` and `abort` on one job.
	job_guards: DashMap<Uuid, Arc<Mutex<()>>>,
	schedule_guard: Mutex<()>,
}

impl RotationManager {
	pub fn new(
		store: Arc<VersionStore>,
		encryption: Arc<EncryptionEngine>,
		jobs: Arc<dyn RotationJobStore>,
		generator: Arc<dyn SecretGenerator>,
		config: RotationConfig,
	) -> Self {
		Self {
			store,
			encryption,
			jobs,
			generator,
			health_checks: Vec::new(),
			notifier: Arc::new(TracingNotifier),
			cache: None,
			audit: None,
			config,
			job_guards: DashMap::new(),
			schedule_guard: Mutex::new(()),
		}
	}

	pub fn with_health_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
		self.health_checks.push(check);
		self
	}

	pub fn with_notifier(mut self, notifier: Arc<dyn RotationNotifier>) -> Self {
		self.notifier = notifier;
		self
	}

	pub fn with_cache(mut self, cache: Arc<CacheLayer>) -> Self {
		self.cache = Some(cache);
		self
	}

	pub fn with_audit(mut self, audit: Arc<AuditService>) -> Self {
		self.audit = Some(audit);
		self
	}

	pub fn config(&self) -> &RotationConfig {
		&self.config
	}

	/// Whether a rotation of `secret` is past `Scheduled` and not finished.
	pub fn is_rotating(&self, secret: &ConfigKey) -> bool {
		self.store.holder_of(secret).is_some()
	}

	/// Schedules a rotation that generates after the notification lead time.
	pub async fn schedule(
		&self,
		secret: &ConfigKey,
		class: SecretClass,
		actor: &ActorId,
	) -> Result<RotationJob> {
		let start_at = Utc::now() + self.lead();
		self.schedule_at(secret, class, start_at, actor).await
	}

	/// Schedules a rotation of `secret` starting at `start_at`.
	///
	/// If a job is already scheduled for the secret it is brought forward to
	/// `start_at` when that is earlier. A job that is already running fails
	/// with [`RotationError::InProgress`].
	#[instrument(skip(self), fields(secret = %secret))]
	pub async fn schedule_at(
		&self,
		secret: &ConfigKey,
		class: SecretClass,
		start_at: DateTime<Utc>,
		actor: &ActorId,
	) -> Result<RotationJob> {
		let _guard = self.schedule_guard.lock().await;

		if self.is_rotating(secret) {
			return Err(RotationError::InProgress(secret.config_id()));
		}
		self.current_secret(secret).await?;

		let open = self
			.jobs
			.list_for(secret)
			.await?
			.into_iter()
			.find(|job| !job.phase.is_terminal());
		if let Some(mut job) = open {
			if job.phase.holds_lock() {
				return Err(RotationError::InProgress(secret.config_id()));
			}
			if start_at < job.start_at {
				job.start_at = start_at;
				job.updated_at = Utc::now();
				self.jobs.save(&job).await?;
				debug!(job_id = %job.id, "scheduled rotation brought forward");
			}
			return Ok(job);
		}

		let job = RotationJob::new(secret.clone(), class, start_at, actor.clone());
		self.jobs.save(&job).await?;
		self.emit(
			AuditEventType::RotationScheduled,
			&job,
			AuditOutcome::Success,
			json!({ "class": class.as_str(), "start_at": start_at }),
		);
		info!(job_id = %job.id, class = class.as_str(), %start_at, "rotation scheduled");
		Ok(job)
	}

	pub async fn job(&self, id: Uuid) -> Result<RotationJob> {
		self.jobs
			.get(id)
			.await?
			.ok_or_else(|| RotationError::NotFound(id.to_string()))
	}

	pub async fn jobs_for(&self, secret: &ConfigKey) -> Result<Vec<RotationJob>> {
		self.jobs.list_for(secret).await
	}

	/// Advances a job as far as it can go now. Returns the job as saved.
	#[instrument(skip(self))]
	pub async fn run(&self, id: Uuid) -> Result<RotationJob> {
		let guard = self.job_guard(id);
		let _held = guard.lock().await;

		let mut job = self.job(id).await?;
		while self.step(&mut job).await? {}
		if job.phase.is_terminal() {
			self.job_guards.remove(&id);
		}
		Ok(job)
	}

	/// Runs every open job that is due. Returns how many changed phase.
	pub async fn tick(&self) -> Result<usize> {
		let mut advanced = 0;
		for job in self.jobs.list_open().await? {
			let before = job.phase;
			match self.run(job.id).await {
				Ok(after) if after.phase != before => advanced += 1,
				Ok(_) => {}
				Err(e) => {
					warn!(job_id = %job.id, secret = %job.secret, error = %e, "rotation step failed");
				}
			}
		}
		Ok(advanced)
	}

	/// Re-acquires holds for persisted jobs that were running when the
	/// process stopped. Returns the open jobs.
	#[instrument(skip(self))]
	pub async fn recover(&self) -> Result<Vec<RotationJob>> {
		let open = self.jobs.list_open().await?;
		for job in open.iter().filter(|job| job.phase.holds_lock()) {
			match self.store.acquire_hold(&job.secret, &holder(job)).await {
				Ok(_) => {}
				Err(StoreError::Held { holder, .. }) => {
					warn!(
						job_id = %job.id,
						holder = %holder,
						secret = %job.secret,
						"two open rotations for one secret"
					);
				}
				Err(e) => return Err(e.into()),
			}
		}
		info!(open = open.len(), "rotation jobs recovered");
		Ok(open)
	}

	/// Stops a job. A job in `DualValid` restores the pre-rotation value first.
	#[instrument(skip(self, reason))]
	pub async fn abort(&self, id: Uuid, actor: &ActorId, reason: &str) -> Result<RotationJob> {
		let guard = self.job_guard(id);
		let _held = guard.lock().await;

		let mut job = self.job(id).await?;
		if !job.phase.can_transition_to(RotationPhase::Aborted) {
			return Err(RotationError::InvalidTransition {
				from: job.phase,
				to: RotationPhase::Aborted,
			});
		}
		if job.phase.holds_lock() {
			self.restore_previous(&job).await?;
		}
		job.failure_reason = Some(format!("aborted by {actor}: {reason}"));
		self.release(&job).await;
		self.transition(&mut job, RotationPhase::Aborted).await?;
		self.emit(
			AuditEventType::RotationAborted,
			&job,
			AuditOutcome::Success,
			json!({ "aborted_by": actor.as_str(), "reason": reason }),
		);
		self.job_guards.remove(&id);
		Ok(job)
	}

	async fn step(&self, job: &mut RotationJob) -> Result<bool> {
		match job.phase {
			RotationPhase::Scheduled => self.start(job).await,
			RotationPhase::Generating => self.generate(job).await,
			RotationPhase::DualValid => self.await_grace(job).await,
			RotationPhase::Verifying => self.verify(job).await,
			RotationPhase::Revoking => self.revoke(job).await,
			RotationPhase::Completed | RotationPhase::RolledBack | RotationPhase::Aborted => {
				Ok(false)
			}
		}
	}

	async fn start(&self, job: &mut RotationJob) -> Result<bool> {
		let now = Utc::now();
		let lead = self.lead();
		if !job.notified && now >= job.start_at - lead {
			self.notifier
				.pre_rotation(job, self.config.notification_lead())
				.await;
			job.notified = true;
			job.updated_at = now;
			self.jobs.save(job).await?;
		}
		if now < job.start_at {
			return Ok(false);
		}

		// The hold and the version it pins are taken in one step, so no write
		// lands between reading the old version and locking out other writers.
		let current = match self.store.acquire_hold(&job.secret, &holder(job)).await {
			Ok(current) => current,
			Err(StoreError::Held { .. }) => {
				return Err(RotationError::InProgress(job.secret.config_id()));
			}
			Err(e) => return Err(e.into()),
		};
		let Some(current) = current.filter(|v| matches!(v.payload, Some(ConfigValue::Secret(_))))
		else {
			self.release(job).await;
			job.failure_reason = Some("secret no longer exists".to_string());
			return self.transition(job, RotationPhase::Aborted).await;
		};

		job.old_version = Some(current.version_number);
		self.transition(job, RotationPhase::Generating).await
	}

	async fn generate(&self, job: &mut RotationJob) -> Result<bool> {
		let marker = job.marker();
		if job.new_version.is_none() {
			// Written before a crash, not yet recorded on the job.
			if let Some(current) = self.store.current(&job.secret).await? {
				if current.change_reason.as_deref() == Some(marker.as_str()) {
					job.new_version = Some(current.version_number);
				}
			}
		}

		if job.new_version.is_none() {
			let candidate = self.generator.generate(&job.secret).await?;
			if !self.generator.validate(&job.secret, &candidate).await? {
				warn!(job_id = %job.id, "generated secret failed validation");
				job.failure_reason = Some("generated secret failed validation".to_string());
				self.release(job).await;
				return self.transition(job, RotationPhase::Aborted).await;
			}
			let payload = self
				.encryption
				.encrypt(candidate.expose().as_slice(), &job.secret.tenant)
				.await?;
			let version = self
				.store
				.put_held(
					&job.secret,
					ConfigValue::Secret(payload),
					&job.requested_by,
					Some(marker),
					&holder(job),
				)
				.await?;
			job.new_version = Some(version.version_number);
		}

		let grace = job.class.settings(&self.config).grace();
		job.grace_deadline = Some(Utc::now() + to_delta(grace));
		self.invalidate(&job.secret).await;
		self.transition(job, RotationPhase::DualValid).await
	}

	async fn await_grace(&self, job: &mut RotationJob) -> Result<bool> {
		match job.grace_deadline {
			Some(deadline) if Utc::now() < deadline => Ok(false),
			_ => self.transition(job, RotationPhase::Verifying).await,
		}
	}

	/// Decides between commit and rollback.
	///
	/// A job re-entering this phase after a restart keeps the decision it had
	/// already acted on: a saved failure reason or a rollback version written
	/// under the job's marker resumes the rollback, and a retired old version
	/// resumes the commit. Health checks run only when neither is found.
	async fn verify(&self, job: &mut RotationJob) -> Result<bool> {
		let new_version = job.new_version.ok_or_else(|| {
			RotationError::JobStore(format!("job {} verifying without a new version", job.id))
		})?;

		let rolling_back = job.failure_reason.is_some() || self.rollback_started(job).await?;
		if !rolling_back {
			if self.old_version_retired(job).await? {
				debug!(job_id = %job.id, "resuming commit");
				return self.commit(job).await;
			}
			let failures = self.check_health(&job.secret, new_version).await;
			if failures.is_empty() {
				return self.commit(job).await;
			}
			job.failure_reason = Some(failures.join("; "));
			job.updated_at = Utc::now();
			self.jobs.save(job).await?;
		}

		let reason = job
			.failure_reason
			.get_or_insert_with(|| "rollback resumed after restart".to_string())
			.clone();
		self.restore_previous(job).await?;
		self.notifier.alert(job, &reason).await;
		self.release(job).await;
		let advanced = self.transition(job, RotationPhase::RolledBack).await?;
		self.emit(
			AuditEventType::RotationRolledBack,
			job,
			AuditOutcome::Failure,
			json!({
				"old_version": job.old_version,
				"new_version": job.new_version,
				"reason": reason,
			}),
		);
		Ok(advanced)
	}

	async fn check_health(&self, secret: &ConfigKey, version: u64) -> Vec<String> {
		let mut failures = Vec::new();
		for check in &self.health_checks {
			let signal = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check.check(secret, version)).await;
			match signal {
				Ok(HealthSignal::Healthy) => {}
				Ok(HealthSignal::Unhealthy(reason)) => {
					failures.push(format!("{}: {reason}", check.name()))
				}
				Err(_) => failures.push(format!("{}: timed out", check.name())),
			}
		}
		failures
	}

	/// Retires the pre-rotation version and moves on to revocation.
	async fn commit(&self, job: &mut RotationJob) -> Result<bool> {
		if let Some(old) = job.old_version {
			self.store
				.set_version_state(&job.secret, old, VersionState::Inactive)
				.await?;
		}
		self.invalidate(&job.secret).await;
		self.transition(job, RotationPhase::Revoking).await
	}

	async fn old_version_retired(&self, job: &RotationJob) -> Result<bool> {
		let Some(old) = job.old_version else {
			return Ok(false);
		};
		Ok(self
			.store
			.read_version(&job.secret, old)
			.await?
			.is_some_and(|v| v.state == VersionState::Inactive))
	}

	/// Whether this job's rollback version is already the current one.
	async fn rollback_started(&self, job: &RotationJob) -> Result<bool> {
		let current = self.store.current(&job.secret).await?;
		Ok(current.as_ref().is_some_and(|c| is_restore_of(job, c)))
	}

	async fn revoke(&self, job: &mut RotationJob) -> Result<bool> {
		let pruned = self.store.prune(&job.secret, None).await?;
		debug!(job_id = %job.id, pruned = pruned.len(), "old versions pruned");

		self.release(job).await;
		let advanced = self.transition(job, RotationPhase::Completed).await?;
		self.emit(
			AuditEventType::RotationCompleted,
			job,
			AuditOutcome::Success,
			json!({ "old_version": job.old_version, "new_version": job.new_version }),
		);

		if self.config.enabled {
			let interval = job.class.settings(&self.config).interval();
			let next = RotationJob::new(
				job.secret.clone(),
				job.class,
				Utc::now() + to_delta(interval),
				job.requested_by.clone(),
			);
			self.jobs.save(&next).await?;
			self.emit(
				AuditEventType::RotationScheduled,
				&next,
				AuditOutcome::Success,
				json!({ "class": next.class.as_str(), "start_at": next.start_at }),
			);
			info!(job_id = %next.id, start_at = %next.start_at, "next rotation scheduled");
		}
		Ok(advanced)
	}

	/// Makes the pre-rotation value current again and retires the new one.
	///
	/// The old payload is re-appended before the new version is marked
	/// inactive, so a reader always sees one of the two.
	async fn restore_previous(&self, job: &RotationJob) -> Result<()> {
		let Some(old) = job.old_version else {
			return Ok(());
		};
		let current = self.store.current(&job.secret).await?;
		let restored = current
			.as_ref()
			.is_some_and(|c| c.version_number == old || is_restore_of(job, c));
		if !restored {
			self.store
				.rollback_held(
					&job.secret,
					old,
					&job.requested_by,
					Some(job.marker()),
					&holder(job),
				)
				.await?;
		}
		if let Some(new) = job.new_version {
			self.store
				.set_version_state(&job.secret, new, VersionState::Inactive)
				.await?;
		}
		self.invalidate(&job.secret).await;
		Ok(())
	}

	async fn transition(&self, job: &mut RotationJob, next: RotationPhase) -> Result<bool> {
		let from = job.phase;
		if !from.can_transition_to(next) {
			return Err(RotationError::InvalidTransition { from, to: next });
		}
		job.phase = next;
		job.updated_at = Utc::now();
		self.jobs.save(job).await?;

		info!(job_id = %job.id, secret = %job.secret, %from, to = %next, "rotation phase changed");
		self.emit(
			AuditEventType::RotationPhaseChanged,
			job,
			AuditOutcome::Success,
			json!({
				"from": from.as_str(),
				"to": next.as_str(),
				"old_version": job.old_version,
				"new_version": job.new_version,
			}),
		);
		Ok(true)
	}

	async fn current_secret(&self, secret: &ConfigKey) -> Result<ConfigVersion> {
		let current = self
			.store
			.current(secret)
			.await?
			.ok_or_else(|| RotationError::NotFound(secret.config_id()))?;
		match current.payload {
			Some(ConfigValue::Secret(_)) => Ok(current),
			_ => Err(RotationError::NotASecret(secret.config_id())),
		}
	}

	async fn invalidate(&self, secret: &ConfigKey) {
		if let Some(cache) = &self.cache {
			cache.invalidate(&InvalidationPattern::scope_of(secret)).await;
		}
	}

	async fn release(&self, job: &RotationJob) {
		self.store.release_hold(&job.secret, &holder(job)).await;
	}

	fn job_guard(&self, id: Uuid) -> Arc<Mutex<()>> {
		Arc::clone(self.job_guards.entry(id).or_default().value())
	}

	fn lead(&self) -> TimeDelta {
		to_delta(self.config.notification_lead())
	}

	fn emit(
		&self,
		event_type: AuditEventType,
		job: &RotationJob,
		outcome: AuditOutcome,
		details: serde_json::Value,
	) {
		if let Some(audit) = &self.audit {
			let mut details = details;
			details["job_id"] = json!(job.id);
			audit.log(
				AuditLogEntry::builder(event_type)
					.outcome(outcome)
					.tenant(&job.secret.tenant)
					.actor(&job.requested_by)
					.resource("secret", job.secret.config_id())
					.action(event_type.as_str())
					.details(details)
					.build(),
			);
		}
	}
}

fn holder(job: &RotationJob) -> String {
	format!("rotation:{}", job.id)
}

/// A rollback version this job appended to restore its old version.
fn is_restore_of(job: &RotationJob, version: &ConfigVersion) -> bool {
	version.change_kind == ChangeKind::Rollback
		&& version.rollback_target.is_some()
		&& version.rollback_target == job.old_version
		&& version.change_reason.as_deref() == Some(job.marker().as_str())
}

/// Converts a configured duration, capping absurd values at a century.
fn to_delta(duration: Duration) -> TimeDelta {
	TimeDelta::from_std(duration)
		.unwrap_or(TimeDelta::MAX)
		.min(TimeDelta::weeks(52 * 100))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::VecDeque;
	use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
	use std::sync::Mutex as StdMutex;

	use async_trait::async_trait;
	use tessera_common_secret::SecretBytes;
	use tessera_config_core::{Environment, TenantId};
	use tessera_server_audit::MemoryAuditSink;
	use tessera_server_config::{CryptoConfig, RotationClassConfig, StoreConfig};
	use tessera_server_db::InMemoryStore;
	use tessera_server_resolve::ResolutionEngine;
	use tessera_server_secrets::{KeyHierarchy, LocalKms};

	use crate::scheduler::RotationScheduler;
	use crate::store::InMemoryJobStore;

	struct Scripted {
		values: StdMutex<VecDeque<&'static str>>,
		accept: bool,
	}

	impl Scripted {
		fn new(values: &[&'static str]) -> Self {
			Self {
				values: StdMutex::new(values.iter().copied().collect()),
				accept: true,
			}
		}
	}

	#[async_trait]
	impl SecretGenerator for Scripted {
		async fn generate(&self, _secret: &ConfigKey) -> Result<SecretBytes> {
			let next = self.values.lock().unwrap().pop_front();
			next.map(|v| SecretBytes::new(v.as_bytes().to_vec()))
				.ok_or_else(|| RotationError::Generation("script exhausted".into()))
		}

		async fn validate(&self, _secret: &ConfigKey, _candidate: &SecretBytes) -> Result<bool> {
			Ok(self.accept)
		}
	}

	struct Consumer {
		healthy: AtomicBool,
	}

	#[async_trait]
	impl HealthCheck for Consumer {
		fn name(&self) -> &str {
			"billing"
		}

		async fn check(&self, _secret: &ConfigKey, _version: u64) -> HealthSignal {
			if self.healthy.load(Ordering::SeqCst) {
				HealthSignal::Healthy
			} else {
				HealthSignal::Unhealthy("login rejected".into())
			}
		}
	}

	#[derive(Default)]
	struct Recorder {
		notices: AtomicUsize,
		alerts: StdMutex<Vec<String>>,
	}

	#[async_trait]
	impl RotationNotifier for Recorder {
		async fn pre_rotation(&self, _job: &RotationJob, _lead: Duration) {
			self.notices.fetch_add(1, Ordering::SeqCst);
		}

		async fn alert(&self, _job: &RotationJob, reason: &str) {
			self.alerts.lock().unwrap().push(reason.to_string());
		}
	}

	struct Fixture {
		store: Arc<VersionStore>,
		encryption: Arc<EncryptionEngine>,
		engine: ResolutionEngine,
		jobs: Arc<InMemoryJobStore>,
		consumer: Arc<Consumer>,
		notifier: Arc<Recorder>,
		sink: Arc<MemoryAuditSink>,
		key: ConfigKey,
		admin: ActorId,
	}

	fn test_config() -> RotationConfig {
		RotationConfig {
			enabled: true,
			notification_lead_secs: 0,
			ephemeral: RotationClassConfig {
				grace_secs: 0,
				interval_secs: 3600,
			},
			..RotationConfig::default()
		}
	}

	async fn fixture() -> Fixture {
		let store = Arc::new(VersionStore::new(
			Arc::new(InMemoryStore::new()),
			StoreConfig::default(),
		));
		let hierarchy = KeyHierarchy::new(Arc::new(LocalKms::new()), &CryptoConfig::default());
		let encryption = Arc::new(EncryptionEngine::new(Arc::new(hierarchy)));
		let engine = ResolutionEngine::new(Arc::clone(&store), Arc::clone(&encryption));
		let key = ConfigKey::new("t1", "svc", "db_pass", Environment::Production);
		let admin = ActorId::new("admin");

		let payload = encryption
			.encrypt(b"pw123", &TenantId::new("t1"))
			.await
			.unwrap();
		store
			.put(&key, ConfigValue::Secret(payload), &admin, None)
			.await
			.unwrap();

		Fixture {
			store,
			encryption,
			engine,
			jobs: Arc::new(InMemoryJobStore::new()),
			consumer: Arc::new(Consumer {
				healthy: AtomicBool::new(true),
			}),
			notifier: Arc::new(Recorder::default()),
			sink: Arc::new(MemoryAuditSink::new()),
			key,
			admin,
		}
	}

	impl Fixture {
		fn manager(&self, generator: Scripted, config: RotationConfig) -> RotationManager {
			RotationManager::new(
				Arc::clone(&self.store),
				Arc::clone(&self.encryption),
				self.jobs.clone(),
				Arc::new(generator),
				config,
			)
			.with_health_check(self.consumer.clone())
			.with_notifier(self.notifier.clone())
			.with_audit(Arc::new(AuditService::with_sink(self.sink.clone())))
		}

		async fn resolved(&self) -> Vec<u8> {
			let resolution = self.engine.resolve(&self.key).await.unwrap();
			resolution.value.as_secret().unwrap().expose().clone()
		}

		async fn version_plaintext(&self, version: u64) -> Vec<u8> {
			let stored = self
				.store
				.read_version(&self.key, version)
				.await
				.unwrap()
				.unwrap();
			let Some(ConfigValue::Secret(payload)) = stored.payload else {
				panic!("version {version} is not a secret");
			};
			self.encryption
				.decrypt(&payload, &self.key.tenant)
				.await
				.unwrap()
				.expose()
				.clone()
		}

		async fn state_of(&self, version: u64) -> VersionState {
			self.store
				.read_version(&self.key, version)
				.await
				.unwrap()
				.unwrap()
				.state
		}
	}

	#[tokio::test]
	async fn healthy_rotation_replaces_the_secret() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());

		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let job = manager.run(job.id).await.unwrap();

		assert_eq!(job.phase, RotationPhase::Completed);
		assert_eq!(job.old_version, Some(1));
		assert_eq!(job.new_version, Some(2));
		assert_eq!(f.resolved().await, b"pw456");
		assert_eq!(f.state_of(1).await, VersionState::Inactive);
		assert_eq!(f.state_of(2).await, VersionState::Active);
		assert!(!manager.is_rotating(&f.key));

		let history = manager.jobs_for(&f.key).await.unwrap();
		assert_eq!(history.len(), 2);
		let next = &history[1];
		assert_eq!(next.phase, RotationPhase::Scheduled);
		assert!(next.start_at > Utc::now() + TimeDelta::minutes(59));

		let completed = f
			.sink
			.wait_for(AuditEventType::RotationCompleted, 1, Duration::from_secs(1))
			.await;
		assert_eq!(completed[0].details["job_id"], json!(job.id));
	}

	#[tokio::test]
	async fn unhealthy_rotation_restores_the_old_value() {
		let f = fixture().await;
		f.consumer.healthy.store(false, Ordering::SeqCst);
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());

		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let job = manager.run(job.id).await.unwrap();

		assert_eq!(job.phase, RotationPhase::RolledBack);
		assert_eq!(f.resolved().await, b"pw123");
		assert_eq!(f.state_of(2).await, VersionState::Inactive);
		assert_eq!(f.version_plaintext(1).await, b"pw123");
		assert!(!manager.is_rotating(&f.key));

		let alerts = f.notifier.alerts.lock().unwrap().clone();
		assert_eq!(alerts, vec!["billing: login rejected".to_string()]);
		assert_eq!(job.failure_reason.as_deref(), Some("billing: login rejected"));

		let current = f.store.current(&f.key).await.unwrap().unwrap();
		assert_eq!(current.change_kind, ChangeKind::Rollback);
		assert_eq!(current.rollback_target, Some(1));

		let rolled_back = f
			.sink
			.wait_for(AuditEventType::RotationRolledBack, 1, Duration::from_secs(1))
			.await;
		assert_eq!(rolled_back[0].outcome, AuditOutcome::Failure);
	}

	#[tokio::test]
	async fn both_values_stay_readable_during_grace() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());

		let job = manager
			.schedule(&f.key, SecretClass::Standard, &f.admin)
			.await
			.unwrap();
		let job = manager.run(job.id).await.unwrap();

		assert_eq!(job.phase, RotationPhase::DualValid);
		assert!(manager.is_rotating(&f.key));
		assert_eq!(f.resolved().await, b"pw456");
		assert_eq!(f.version_plaintext(1).await, b"pw123");
		assert_eq!(f.state_of(1).await, VersionState::Active);

		let again = manager
			.schedule(&f.key, SecretClass::Standard, &f.admin)
			.await
			.unwrap_err();
		assert!(matches!(again, RotationError::InProgress(_)));
		assert_eq!(again.kind(), tessera_config_core::ErrorKind::RotationInProgress);
	}

	#[tokio::test]
	async fn abort_during_grace_restores_the_old_value() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());

		let job = manager
			.schedule(&f.key, SecretClass::Standard, &f.admin)
			.await
			.unwrap();
		manager.run(job.id).await.unwrap();

		let aborted = manager
			.abort(job.id, &ActorId::new("oncall"), "consumer not ready")
			.await
			.unwrap();

		assert_eq!(aborted.phase, RotationPhase::Aborted);
		assert_eq!(f.resolved().await, b"pw123");
		assert_eq!(f.state_of(2).await, VersionState::Inactive);
		assert!(!manager.is_rotating(&f.key));

		let err = manager
			.abort(job.id, &f.admin, "twice")
			.await
			.unwrap_err();
		assert!(matches!(err, RotationError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn scheduling_twice_brings_the_job_forward() {
		let f = fixture().await;
		let mut config = test_config();
		config.notification_lead_secs = 3600;
		let manager = f.manager(Scripted::new(&["pw456"]), config);

		let first = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let now = Utc::now();
		let second = manager
			.schedule_at(&f.key, SecretClass::Ephemeral, now, &f.admin)
			.await
			.unwrap();

		assert_eq!(first.id, second.id);
		assert_eq!(second.start_at, now);
		assert_eq!(manager.jobs_for(&f.key).await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn notification_precedes_generation() {
		let f = fixture().await;
		let mut config = test_config();
		config.notification_lead_secs = 3600;
		let manager = f.manager(Scripted::new(&["pw456"]), config);

		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let first = manager.run(job.id).await.unwrap();
		let second = manager.run(job.id).await.unwrap();

		assert_eq!(second.phase, RotationPhase::Scheduled);
		assert!(first.notified);
		assert_eq!(f.notifier.notices.load(Ordering::SeqCst), 1);
		assert_eq!(f.resolved().await, b"pw123");
		assert!(!manager.is_rotating(&f.key));
	}

	#[tokio::test]
	async fn rejected_candidate_aborts_without_writing() {
		let f = fixture().await;
		let mut generator = Scripted::new(&["weak"]);
		generator.accept = false;
		let manager = f.manager(generator, test_config());

		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let job = manager.run(job.id).await.unwrap();

		assert_eq!(job.phase, RotationPhase::Aborted);
		assert_eq!(f.store.history(&f.key).await.unwrap().len(), 1);
		assert!(!manager.is_rotating(&f.key));
	}

	#[tokio::test]
	async fn plain_values_cannot_be_rotated() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&[]), test_config());
		let flag = ConfigKey::new("t1", "svc", "feature", Environment::Production);
		f.store
			.put(&flag, ConfigValue::Boolean(true), &f.admin, None)
			.await
			.unwrap();

		let err = manager
			.schedule(&flag, SecretClass::Standard, &f.admin)
			.await
			.unwrap_err();
		assert!(matches!(err, RotationError::NotASecret(_)));

		let missing = ConfigKey::new("t1", "svc", "missing", Environment::Production);
		let err = manager
			.schedule(&missing, SecretClass::Standard, &f.admin)
			.await
			.unwrap_err();
		assert!(matches!(err, RotationError::NotFound(_)));
	}

	#[tokio::test]
	async fn restart_resumes_at_the_saved_phase() {
		let f = fixture().await;
		let before = f.manager(Scripted::new(&["pw456"]), test_config());
		let job = before
			.schedule(&f.key, SecretClass::Standard, &f.admin)
			.await
			.unwrap();
		let job = before.run(job.id).await.unwrap();
		assert_eq!(job.phase, RotationPhase::DualValid);
		drop(before);

		let mut expired = job.clone();
		expired.grace_deadline = Some(Utc::now() - TimeDelta::seconds(1));
		f.jobs.save(&expired).await.unwrap();

		// Holds live in process memory; a new process starts without them.
		assert!(f.store.release_hold(&f.key, &holder(&job)).await);
		let after = f.manager(Scripted::new(&[]), test_config());
		assert!(!after.is_rotating(&f.key));
		let open = after.recover().await.unwrap();
		assert_eq!(open.len(), 1);
		assert!(after.is_rotating(&f.key));

		let done = after.run(job.id).await.unwrap();
		assert_eq!(done.phase, RotationPhase::Completed);
		assert_eq!(f.resolved().await, b"pw456");
	}

	#[tokio::test]
	async fn generation_interrupted_after_write_is_not_repeated() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&[]), test_config());
		let mut job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();

		// State left by a crash between the write and the job save.
		let payload = f
			.encryption
			.encrypt(b"pw456", &f.key.tenant)
			.await
			.unwrap();
		f.store
			.put(&f.key, ConfigValue::Secret(payload), &f.admin, Some(job.marker()))
			.await
			.unwrap();
		job.phase = RotationPhase::Generating;
		job.old_version = Some(1);
		f.jobs.save(&job).await.unwrap();
		manager.recover().await.unwrap();

		let done = manager.run(job.id).await.unwrap();

		assert_eq!(done.phase, RotationPhase::Completed);
		assert_eq!(done.new_version, Some(2));
		assert_eq!(f.store.history(&f.key).await.unwrap().len(), 2);
		assert_eq!(f.resolved().await, b"pw456");
	}

	#[tokio::test]
	async fn scheduler_drives_due_jobs() {
		let f = fixture().await;
		let manager = Arc::new(f.manager(Scripted::new(&["pw456"]), test_config()));
		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();

		let shutdown = tokio_util::sync::CancellationToken::new();
		let handle = RotationScheduler::with_poll(Arc::clone(&manager), Duration::from_millis(5))
			.spawn(shutdown.clone());

		let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
		loop {
			if manager.job(job.id).await.unwrap().phase == RotationPhase::Completed {
				break;
			}
			assert!(tokio::time::Instant::now() < deadline, "rotation did not complete");
			tokio::time::sleep(Duration::from_millis(5)).await;
		}

		shutdown.cancel();
		handle.await.unwrap();
		assert_eq!(f.resolved().await, b"pw456");
	}

	/// Drives a Standard-class job to `DualValid`, then saves it as if the
	/// process stopped while verifying with the grace period over.
	async fn verifying_after_grace(f: &Fixture, manager: &RotationManager) -> RotationJob {
		let job = manager
			.schedule(&f.key, SecretClass::Standard, &f.admin)
			.await
			.unwrap();
		let mut job = manager.run(job.id).await.unwrap();
		assert_eq!(job.phase, RotationPhase::DualValid);
		job.phase = RotationPhase::Verifying;
		job.grace_deadline = Some(Utc::now() - TimeDelta::seconds(1));
		job
	}

	#[tokio::test]
	async fn rollback_interrupted_after_restore_finishes_as_rolled_back() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());
		let job = verifying_after_grace(&f, &manager).await;

		// Crash after the old value was re-appended, before the job was saved.
		f.store
			.rollback_held(&f.key, 1, &f.admin, Some(job.marker()), &holder(&job))
			.await
			.unwrap();
		f.jobs.save(&job).await.unwrap();
		assert!(f.consumer.healthy.load(Ordering::SeqCst));

		manager.recover().await.unwrap();
		let done = manager.run(job.id).await.unwrap();

		assert_eq!(done.phase, RotationPhase::RolledBack);
		assert_eq!(done.failure_reason.as_deref(), Some("rollback resumed after restart"));
		assert_eq!(f.resolved().await, b"pw123");
		assert_eq!(f.state_of(2).await, VersionState::Inactive);
		assert_eq!(f.store.history(&f.key).await.unwrap().len(), 3);
		assert!(!manager.is_rotating(&f.key));
	}

	#[tokio::test]
	async fn saved_rollback_decision_survives_a_recovered_consumer() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());
		let mut job = verifying_after_grace(&f, &manager).await;

		// Crash after the unhealthy verdict was saved, before the restore.
		job.failure_reason = Some("billing: login rejected".to_string());
		f.jobs.save(&job).await.unwrap();

		let done = manager.run(job.id).await.unwrap();

		assert_eq!(done.phase, RotationPhase::RolledBack);
		assert_eq!(done.failure_reason.as_deref(), Some("billing: login rejected"));
		assert_eq!(f.resolved().await, b"pw123");
		assert_eq!(f.state_of(2).await, VersionState::Inactive);
	}

	#[tokio::test]
	async fn commit_interrupted_after_retiring_old_version_is_not_reverted() {
		let f = fixture().await;
		let manager = f.manager(Scripted::new(&["pw456"]), test_config());
		let job = verifying_after_grace(&f, &manager).await;

		f.store
			.set_version_state(&f.key, 1, VersionState::Inactive)
			.await
			.unwrap();
		f.jobs.save(&job).await.unwrap();
		f.consumer.healthy.store(false, Ordering::SeqCst);

		let done = manager.run(job.id).await.unwrap();

		assert_eq!(done.phase, RotationPhase::Completed);
		assert_eq!(f.resolved().await, b"pw456");
		assert!(f.notifier.alerts.lock().unwrap().is_empty());
	}

	/// Blocks inside `generate` until the test lets it continue.
	struct Paused {
		entered: Arc<tokio::sync::Notify>,
		resume: Arc<tokio::sync::Notify>,
	}

	#[async_trait]
	impl SecretGenerator for Paused {
		async fn generate(&self, _secret: &ConfigKey) -> Result<SecretBytes> {
			self.entered.notify_one();
			self.resume.notified().await;
			Ok(SecretBytes::new(b"pw456".to_vec()))
		}
	}

	#[tokio::test]
	async fn writes_during_generation_are_refused_not_lost() {
		let f = fixture().await;
		f.consumer.healthy.store(false, Ordering::SeqCst);
		let entered = Arc::new(tokio::sync::Notify::new());
		let resume = Arc::new(tokio::sync::Notify::new());
		let manager = Arc::new(
			RotationManager::new(
				Arc::clone(&f.store),
				Arc::clone(&f.encryption),
				f.jobs.clone(),
				Arc::new(Paused {
					entered: entered.clone(),
					resume: resume.clone(),
				}),
				test_config(),
			)
			.with_health_check(f.consumer.clone())
			.with_notifier(f.notifier.clone()),
		);

		let job = manager
			.schedule(&f.key, SecretClass::Ephemeral, &f.admin)
			.await
			.unwrap();
		let running = tokio::spawn({
			let manager = Arc::clone(&manager);
			async move { manager.run(job.id).await }
		});
		entered.notified().await;

		let payload = f.encryption.encrypt(b"manual", &f.key.tenant).await.unwrap();
		let err = f
			.store
			.put(&f.key, ConfigValue::Secret(payload), &f.admin, None)
			.await
			.unwrap_err();
		assert_eq!(err.kind(), tessera_config_core::ErrorKind::RotationInProgress);
		assert!(manager.is_rotating(&f.key));

		resume.notify_one();
		let done = running.await.unwrap().unwrap();
		assert_eq!(done.phase, RotationPhase::RolledBack);

		let history = f.store.history(&f.key).await.unwrap();
		assert_eq!(history.len(), 3);
		assert!(history.iter().all(|v| v.changed_by == f.admin));
		assert_eq!(f.resolved().await, b"pw123");
		assert!(!manager.is_rotating(&f.key));
	}
}
