// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuditConfigLayer, AuthConfigLayer, CacheConfigLayer, CryptoConfigLayer, DatabaseConfigLayer,
	LoggingConfigLayer, QueueOverflowPolicy, RotationClassConfigLayer, RotationConfigLayer,
	StoreBackend, StoreConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tessera/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TESSERA_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			logging: Some(load_logging_from_env()?),
			database: Some(load_database_from_env()?),
			crypto: Some(load_crypto_from_env()?),
			store: Some(load_store_from_env()?),
			cache: Some(load_cache_from_env()?),
			auth: Some(load_auth_from_env()?),
			rotation: Some(load_rotation_from_env()?),
			audit: Some(load_audit_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str, type_name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {type_name} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_parse(name, "u32")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	env_parse(name, "usize")
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("TESSERA_LOG_LEVEL"),
		json: env_bool("TESSERA_LOG_JSON"),
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	let backend = match env_var("TESSERA_DATABASE_BACKEND") {
		Some(v) => Some(match v.to_lowercase().as_str() {
			"memory" => StoreBackend::Memory,
			"sqlite" => StoreBackend::Sqlite,
			other => {
				return Err(ConfigError::InvalidValue {
					key: "TESSERA_DATABASE_BACKEND".to_string(),
					message: format!("unknown backend '{other}'"),
				})
			}
		}),
		None => None,
	};

	Ok(DatabaseConfigLayer {
		backend,
		url: env_var("TESSERA_DATABASE_URL"),
		max_connections: env_u32("TESSERA_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_crypto_from_env() -> Result<CryptoConfigLayer, ConfigError> {
	Ok(CryptoConfigLayer {
		kms_timeout_ms: env_u64("TESSERA_CRYPTO_KMS_TIMEOUT_MS")?,
		kek_cache_ttl_secs: env_u64("TESSERA_CRYPTO_KEK_CACHE_TTL_SECS")?,
		kek_deletion_grace_secs: env_u64("TESSERA_CRYPTO_KEK_DELETION_GRACE_SECS")?,
	})
}

fn load_store_from_env() -> Result<StoreConfigLayer, ConfigError> {
	Ok(StoreConfigLayer {
		retention_keep_latest: env_usize("TESSERA_STORE_RETENTION_KEEP_LATEST")?,
		max_entries_per_tenant: env_usize("TESSERA_STORE_MAX_ENTRIES_PER_TENANT")?,
		max_value_bytes: env_usize("TESSERA_STORE_MAX_VALUE_BYTES")?,
		write_retry_attempts: env_u32("TESSERA_STORE_WRITE_RETRY_ATTEMPTS")?,
	})
}

fn load_cache_from_env() -> Result<CacheConfigLayer, ConfigError> {
	Ok(CacheConfigLayer {
		local_capacity: env_usize("TESSERA_CACHE_LOCAL_CAPACITY")?,
		local_ttl_secs: env_u64("TESSERA_CACHE_LOCAL_TTL_SECS")?,
		shared_ttl_secs: env_u64("TESSERA_CACHE_SHARED_TTL_SECS")?,
		invalidation_topic: env_var("TESSERA_CACHE_INVALIDATION_TOPIC"),
		broadcast_retry_attempts: env_u32("TESSERA_CACHE_BROADCAST_RETRY_ATTEMPTS")?,
		broadcast_retry_base_ms: env_u64("TESSERA_CACHE_BROADCAST_RETRY_BASE_MS")?,
	})
}

fn load_auth_from_env() -> Result<AuthConfigLayer, ConfigError> {
	Ok(AuthConfigLayer {
		decision_ttl_secs: env_u64("TESSERA_AUTH_DECISION_TTL_SECS")?,
		decision_cache_capacity: env_usize("TESSERA_AUTH_DECISION_CACHE_CAPACITY")?,
	})
}

fn load_rotation_class_from_env(
	class: &str,
) -> Result<Option<RotationClassConfigLayer>, ConfigError> {
	let grace_secs = env_u64(&format!("TESSERA_ROTATION_{class}_GRACE_SECS"))?;
	let interval_secs = env_u64(&format!("TESSERA_ROTATION_{class}_INTERVAL_SECS"))?;
	if grace_secs.is_none() && interval_secs.is_none() {
		return Ok(None);
	}
	Ok(Some(RotationClassConfigLayer {
		grace_secs,
		interval_secs,
	}))
}

fn load_rotation_from_env() -> Result<RotationConfigLayer, ConfigError> {
	Ok(RotationConfigLayer {
		enabled: env_bool("TESSERA_ROTATION_ENABLED"),
		notification_lead_secs: env_u64("TESSERA_ROTATION_NOTIFICATION_LEAD_SECS")?,
		scheduler_poll_secs: env_u64("TESSERA_ROTATION_SCHEDULER_POLL_SECS")?,
		ephemeral: load_rotation_class_from_env("EPHEMERAL")?,
		standard: load_rotation_class_from_env("STANDARD")?,
		long_lived: load_rotation_class_from_env("LONG_LIVED")?,
	})
}

fn load_audit_from_env() -> Result<AuditConfigLayer, ConfigError> {
	let queue_overflow_policy =
		env_var("TESSERA_AUDIT_QUEUE_OVERFLOW_POLICY").map(|v| match v.to_lowercase().as_str() {
			"drop_oldest" => QueueOverflowPolicy::DropOldest,
			"block" => QueueOverflowPolicy::Block,
			_ => QueueOverflowPolicy::DropNewest,
		});

	Ok(AuditConfigLayer {
		enabled: env_bool("TESSERA_AUDIT_ENABLED"),
		queue_capacity: env_usize("TESSERA_AUDIT_QUEUE_CAPACITY")?,
		queue_overflow_policy,
		min_severity: env_var("TESSERA_AUDIT_MIN_SEVERITY"),
	})
}
