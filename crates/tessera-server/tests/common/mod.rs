// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tessera_common_secret::SecretBytes;
use tessera_config_core::{ActorId, ConfigKey, Environment, ResolvedValue, TenantId};
use tessera_server::{Tessera, TesseraBuilder};
use tessera_server_audit::MemoryAuditSink;
use tessera_server_auth::{AuthContext, Role, RulePolicy};
use tessera_server_config::{RotationClassConfig, ServerConfig, StoreBackend};
use tessera_server_rotation::{HealthCheck, HealthSignal, RotationError, SecretGenerator};

pub fn test_config() -> ServerConfig {
	let mut config = ServerConfig::default();
	config.database.backend = StoreBackend::Memory;
	config.rotation.enabled = false;
	config.rotation.notification_lead_secs = 0;
	config.rotation.ephemeral = RotationClassConfig {
		grace_secs: 0,
		interval_secs: 3600,
	};
	config.auth.decision_ttl_secs = 0;
	config.cache.broadcast_retry_attempts = 2;
	config.cache.broadcast_retry_base_ms = 1;
	config
}

pub fn db_pass() -> ConfigKey {
	ConfigKey::new("t1", "svc", "db_pass", Environment::Production)
}

pub fn ctx() -> AuthContext {
	AuthContext::with_request_id("req-1")
}

pub fn secret_of(value: &ResolvedValue) -> Vec<u8> {
	value
		.as_secret()
		.map(|s| s.expose().clone())
		.unwrap_or_default()
}

/// Hands out scripted secret values in order.
pub struct ScriptedGenerator {
	values: Mutex<VecDeque<&'static str>>,
}

impl ScriptedGenerator {
	pub fn new(values: &[&'static str]) -> Self {
		Self {
			values: Mutex::new(values.iter().copied().collect()),
		}
	}
}

#[async_trait]
impl SecretGenerator for ScriptedGenerator {
	async fn generate(&self, _secret: &ConfigKey) -> Result<SecretBytes, RotationError> {
		let next = self.values.lock().unwrap().pop_front();
		next.map(|v| SecretBytes::new(v.as_bytes().to_vec()))
			.ok_or_else(|| RotationError::Generation("no scripted value left".into()))
	}
}

/// Health check whose answer the test controls.
pub struct Switch {
	pub healthy: AtomicBool,
}

impl Switch {
	pub fn healthy() -> Arc<Self> {
		Arc::new(Self {
			healthy: AtomicBool::new(true),
		})
	}

	pub fn set(&self, healthy: bool) {
		self.healthy.store(healthy, Ordering::SeqCst);
	}
}

#[async_trait]
impl HealthCheck for Switch {
	fn name(&self) -> &str {
		"consumer"
	}

	async fn check(&self, _secret: &ConfigKey, _version: u64) -> HealthSignal {
		if self.healthy.load(Ordering::SeqCst) {
			HealthSignal::Healthy
		} else {
			HealthSignal::Unhealthy("authentication failures rising".into())
		}
	}
}

pub struct Harness {
	pub tessera: Tessera,
	pub policy: Arc<RulePolicy>,
	pub audit: Arc<MemoryAuditSink>,
	pub health: Arc<Switch>,
	pub admin: ActorId,
	pub editor: ActorId,
	pub viewer: ActorId,
}

pub async fn harness() -> Harness {
	harness_with(|config, policy| TesseraBuilder::new(config, policy)).await
}

/// Builds a harness, letting the caller add collaborators to the builder.
pub async fn harness_with(
	builder: impl FnOnce(ServerConfig, Arc<RulePolicy>) -> TesseraBuilder,
) -> Harness {
	let policy = Arc::new(RulePolicy::new());
	let tenant = TenantId::new("t1");
	let admin = ActorId::new("alice");
	let editor = ActorId::new("deploy-bot");
	let viewer = ActorId::new("dashboard");
	policy.grant(&admin, Role::Admin, &tenant).await.unwrap();
	policy.grant(&editor, Role::Editor, &tenant).await.unwrap();
	policy.grant(&viewer, Role::Viewer, &tenant).await.unwrap();

	let audit = Arc::new(MemoryAuditSink::new());
	let health = Switch::healthy();
	let tessera = builder(test_config(), policy.clone())
		.generator(Arc::new(ScriptedGenerator::new(&["pw456", "pw789"])))
		.health_check(health.clone())
		.audit_sink(audit.clone())
		.build()
		.await
		.unwrap();

	Harness {
		tessera,
		policy,
		audit,
		health,
		admin,
		editor,
		viewer,
	}
}
