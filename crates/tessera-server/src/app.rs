// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring of the core components from a [`ServerConfig`].

use std::sync::Arc;

use tessera_server_audit::{
	AuditFilterConfig, AuditService, AuditSink, InstanceEnricher, TracingAuditSink,
};
use tessera_server_auth::{AuthorizationGate, PolicyDecisionPoint};
use tessera_server_cache::{CacheLayer, InvalidationTransport, SharedTier};
use tessera_server_config::{ServerConfig, StoreBackend};
use tessera_server_db::{
	create_pool, DurableStore, InMemoryKeyStore, InMemoryStore, SqliteStore, TenantKeyStore,
	VersionStore,
};
use tessera_server_resolve::{ResolutionEngine, SchemaRegistry};
use tessera_server_rotation::{
	HealthCheck, InMemoryJobStore, RandomSecretGenerator, RotationJobStore, RotationManager,
	RotationNotifier, RotationScheduler, SecretGenerator,
};
use tessera_server_secrets::{
	EncryptionEngine, KeyAccess, KeyHierarchy, KeyManagementProvider, LocalKms,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::rewrap::RewrapWorker;
use crate::service::ConfigService;

/// Collects the external collaborators and builds a [`Tessera`].
///
/// Anything not supplied falls back to the in-process implementation: local
/// KMS, in-memory job store, random secret generator, no shared cache tier
/// and no invalidation transport.
pub struct TesseraBuilder {
	config: ServerConfig,
	policy: Arc<dyn PolicyDecisionPoint>,
	kms: Option<Arc<dyn KeyManagementProvider>>,
	keys: Option<Arc<KeyHierarchy>>,
	durable: Option<Arc<dyn DurableStore>>,
	key_records: Option<Arc<dyn TenantKeyStore>>,
	schemas: Option<Arc<dyn SchemaRegistry>>,
	shared: Option<Arc<dyn SharedTier>>,
	transport: Option<Arc<dyn InvalidationTransport>>,
	jobs: Option<Arc<dyn RotationJobStore>>,
	generator: Option<Arc<dyn SecretGenerator>>,
	notifier: Option<Arc<dyn RotationNotifier>>,
	health_checks: Vec<Arc<dyn HealthCheck>>,
	audit_sinks: Vec<Arc<dyn AuditSink>>,
}

impl TesseraBuilder {
	pub fn new(config: ServerConfig, policy: Arc<dyn PolicyDecisionPoint>) -> Self {
		Self {
			config,
			policy,
			kms: None,
			keys: None,
			durable: None,
			key_records: None,
			schemas: None,
			shared: None,
			transport: None,
			jobs: None,
			generator: None,
			notifier: None,
			health_checks: Vec::new(),
			audit_sinks: Vec::new(),
		}
	}

	pub fn kms(mut self, kms: Arc<dyn KeyManagementProvider>) -> Self {
		self.kms = Some(kms);
		self
	}

	/// Shares a key hierarchy with other instances in the same process.
	pub fn key_hierarchy(mut self, keys: Arc<KeyHierarchy>) -> Self {
		self.keys = Some(keys);
		self
	}

	/// Overrides the durable store selected by `database.backend`.
	pub fn durable_store(mut self, durable: Arc<dyn DurableStore>) -> Self {
		self.durable = Some(durable);
		self
	}

	/// Where tenant KEK records live. Defaults to the SQLite database for the
	/// sqlite backend and to process memory otherwise.
	pub fn key_store(mut self, records: Arc<dyn TenantKeyStore>) -> Self {
		self.key_records = Some(records);
		self
	}

	pub fn schemas(mut self, schemas: Arc<dyn SchemaRegistry>) -> Self {
		self.schemas = Some(schemas);
		self
	}

	pub fn shared_tier(mut self, shared: Arc<dyn SharedTier>) -> Self {
		self.shared = Some(shared);
		self
	}

	pub fn transport(mut self, transport: Arc<dyn InvalidationTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn job_store(mut self, jobs: Arc<dyn RotationJobStore>) -> Self {
		self.jobs = Some(jobs);
		self
	}

	pub fn generator(mut self, generator: Arc<dyn SecretGenerator>) -> Self {
		self.generator = Some(generator);
		self
	}

	pub fn notifier(mut self, notifier: Arc<dyn RotationNotifier>) -> Self {
		self.notifier = Some(notifier);
		self
	}

	pub fn health_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
		self.health_checks.push(check);
		self
	}

	/// Adds an audit sink. With none, events go to the tracing sink.
	pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
		self.audit_sinks.push(sink);
		self
	}

	pub async fn build(self) -> Result<Tessera> {
		let config = self.config;
		let instance = Uuid::new_v4();

		let sinks = if self.audit_sinks.is_empty() {
			vec![Arc::new(TracingAuditSink::new(AuditFilterConfig::default())) as Arc<dyn AuditSink>]
		} else {
			self.audit_sinks
		};
		let audit = Arc::new(AuditService::from_config(
			&config.audit,
			Arc::new(InstanceEnricher::new(instance.to_string())),
			sinks,
		)?);

		let mut sqlite: Option<Arc<SqliteStore>> = None;
		let durable: Arc<dyn DurableStore> = match self.durable {
			Some(durable) => durable,
			None => match config.database.backend {
				StoreBackend::Memory => Arc::new(InMemoryStore::new()),
				StoreBackend::Sqlite => {
					let pool =
						create_pool(&config.database.url, config.database.max_connections).await?;
					let store = Arc::new(SqliteStore::new(pool));
					store.migrate().await?;
					sqlite = Some(Arc::clone(&store));
					store
				}
			},
		};
		let key_records: Arc<dyn TenantKeyStore> = match (self.key_records, sqlite) {
			(Some(records), _) => records,
			(None, Some(sqlite)) => sqlite,
			(None, None) => Arc::new(InMemoryKeyStore::new()),
		};
		let store = Arc::new(
			VersionStore::new(durable, config.store.clone()).with_audit(Arc::clone(&audit)),
		);

		let keys = match self.keys {
			Some(keys) => keys,
			None => {
				let kms = self
					.kms
					.unwrap_or_else(|| Arc::new(LocalKms::new()) as Arc<dyn KeyManagementProvider>);
				let keys = KeyHierarchy::new(kms, &config.crypto)
					.with_key_store(key_records)
					.with_audit(Arc::clone(&audit));
				keys.load().await?;
				Arc::new(keys)
			}
		};
		let key_access: Arc<dyn KeyAccess> = Arc::clone(&keys) as Arc<dyn KeyAccess>;
		let encryption =
			Arc::new(EncryptionEngine::new(key_access).with_audit(Arc::clone(&audit)));

		let mut engine = ResolutionEngine::new(Arc::clone(&store), Arc::clone(&encryption));
		if let Some(schemas) = self.schemas {
			engine = engine.with_schemas(schemas);
		}

		let mut cache = CacheLayer::new(Arc::new(engine), config.cache.clone())
			.with_audit(Arc::clone(&audit));
		if let Some(shared) = self.shared {
			cache = cache.with_shared_tier(shared);
		}
		if let Some(transport) = self.transport {
			cache = cache.with_transport(transport);
		}
		let cache = Arc::new(cache);
		store.add_listener(cache.commit_listener());

		let gate = Arc::new(
			AuthorizationGate::new(self.policy, &config.auth).with_audit(Arc::clone(&audit)),
		);

		let jobs = self
			.jobs
			.unwrap_or_else(|| Arc::new(InMemoryJobStore::new()) as Arc<dyn RotationJobStore>);
		let generator = self
			.generator
			.unwrap_or_else(|| Arc::new(RandomSecretGenerator::default()) as Arc<dyn SecretGenerator>);
		let mut rotation = RotationManager::new(
			Arc::clone(&store),
			Arc::clone(&encryption),
			jobs,
			generator,
			config.rotation.clone(),
		)
		.with_cache(Arc::clone(&cache))
		.with_audit(Arc::clone(&audit));
		if let Some(notifier) = self.notifier {
			rotation = rotation.with_notifier(notifier);
		}
		for check in self.health_checks {
			rotation = rotation.with_health_check(check);
		}
		let rotation = Arc::new(rotation);

		let service = Arc::new(
			ConfigService::new(
				Arc::clone(&store),
				Arc::clone(&cache),
				gate,
				Arc::clone(&encryption),
				Arc::clone(&keys),
				Arc::clone(&rotation),
			)
			.with_audit(Arc::clone(&audit)),
		);

		info!(
			instance = %instance,
			backend = ?config.database.backend,
			"tessera core initialised"
		);
		Ok(Tessera {
			config,
			service,
			store,
			cache,
			keys,
			encryption,
			rotation,
		})
	}
}

/// A wired instance of the core.
pub struct Tessera {
	config: ServerConfig,
	service: Arc<ConfigService>,
	store: Arc<VersionStore>,
	cache: Arc<CacheLayer>,
	keys: Arc<KeyHierarchy>,
	encryption: Arc<EncryptionEngine>,
	rotation: Arc<RotationManager>,
}

impl Tessera {
	pub fn service(&self) -> &Arc<ConfigService> {
		&self.service
	}

	pub fn store(&self) -> &Arc<VersionStore> {
		&self.store
	}

	pub fn cache(&self) -> &Arc<CacheLayer> {
		&self.cache
	}

	pub fn keys(&self) -> &Arc<KeyHierarchy> {
		&self.keys
	}

	pub fn encryption(&self) -> &Arc<EncryptionEngine> {
		&self.encryption
	}

	pub fn rotation(&self) -> &Arc<RotationManager> {
		&self.rotation
	}

	/// Spawns the background tasks: the cache invalidation subscriber, the
	/// rotation scheduler (when rotation is enabled) and the re-wrap worker.
	///
	/// The re-wrap worker runs in only one of the instances sharing a key
	/// hierarchy. All tasks stop when `shutdown` is cancelled.
	pub async fn start(&self, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
		let mut handles = Vec::new();

		if let Some(subscriber) = self.cache.spawn_subscriber(shutdown.clone()).await? {
			handles.push(subscriber);
		}

		if self.config.rotation.enabled {
			let scheduler = RotationScheduler::new(Arc::clone(&self.rotation));
			handles.push(scheduler.spawn(shutdown.clone()));
		} else {
			info!("secret rotation scheduler disabled");
		}

		match self.keys.take_rewrap_receiver() {
			Some(requests) => {
				let worker = RewrapWorker::new(Arc::clone(&self.store), Arc::clone(&self.encryption));
				handles.push(worker.spawn(requests, shutdown.clone()));
			}
			None => warn!("re-wrap worker already running for this key hierarchy"),
		}

		info!(tasks = handles.len(), "background tasks started");
		Ok(handles)
	}
}
