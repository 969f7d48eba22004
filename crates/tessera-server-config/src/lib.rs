// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the Tessera server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with cross-field validation
//! - Consistent environment variable naming (`TESSERA_*`)
//!
//! # Usage
//!
//! ```ignore
//! use tessera_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("local cache capacity {}", config.cache.local_capacity);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
	pub logging: LoggingConfig,
	pub database: DatabaseConfig,
	pub crypto: CryptoConfig,
	pub store: StoreConfig,
	pub cache: CacheConfig,
	pub auth: AuthConfig,
	pub rotation: RotationConfig,
	pub audit: AuditConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TESSERA_*`)
/// 2. Config file (`/etc/tessera/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		logging: layer.logging.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		crypto: layer.crypto.unwrap_or_default().finalize(),
		store: layer.store.unwrap_or_default().finalize(),
		cache: layer.cache.unwrap_or_default().finalize(),
		auth: layer.auth.unwrap_or_default().finalize(),
		rotation: layer.rotation.unwrap_or_default().finalize(),
		audit: layer.audit.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		backend = ?config.database.backend,
		local_cache_capacity = config.cache.local_capacity,
		local_cache_ttl_secs = config.cache.local_ttl_secs,
		kms_timeout_ms = config.crypto.kms_timeout_ms,
		rotation_enabled = config.rotation.enabled,
		audit_enabled = config.audit.enabled,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	let cache = &config.cache;
	if cache.local_capacity == 0 {
		return Err(ConfigError::Validation(
			"cache.local_capacity must be greater than zero".to_string(),
		));
	}
	if cache.local_ttl_secs > cache.shared_ttl_secs {
		return Err(ConfigError::Validation(format!(
			"cache.local_ttl_secs ({}) must not exceed cache.shared_ttl_secs ({})",
			cache.local_ttl_secs, cache.shared_ttl_secs
		)));
	}
	if config.crypto.kms_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"crypto.kms_timeout_ms must be greater than zero".to_string(),
		));
	}
	if config.store.retention_keep_latest == 0 {
		return Err(ConfigError::Validation(
			"store.retention_keep_latest must keep at least one version".to_string(),
		));
	}
	if config.store.max_value_bytes == 0 || config.store.max_entries_per_tenant == 0 {
		return Err(ConfigError::Validation(
			"store quotas must be greater than zero".to_string(),
		));
	}
	if config.auth.decision_cache_capacity == 0 {
		return Err(ConfigError::Validation(
			"auth.decision_cache_capacity must be greater than zero".to_string(),
		));
	}
	if config.audit.queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"audit.queue_capacity must be greater than zero".to_string(),
		));
	}
	let rotation = &config.rotation;
	for (name, class) in [
		("ephemeral", rotation.ephemeral),
		("standard", rotation.standard),
		("long_lived", rotation.long_lived),
	] {
		if class.grace_secs > class.interval_secs {
			return Err(ConfigError::Validation(format!(
				"rotation.{name}.grace_secs must not exceed rotation.{name}.interval_secs"
			)));
		}
	}

	Ok(())
}
