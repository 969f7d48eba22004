// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tessera_config_core::{ConfigKey, ConfigValue, Environment, ResolvedValue};
use tessera_server_db::VersionStore;
use tessera_server_secrets::EncryptionEngine;
use tracing::{debug, instrument};

use crate::error::{ResolveError, Result};
use crate::merge::deep_merge;
use crate::schema::SchemaRegistry;
use crate::template::{self, MAX_TEMPLATE_DEPTH};

/// Outcome of resolving one key at one environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
	pub key: ConfigKey,
	pub value: ResolvedValue,
	/// Layers that contributed, lowest priority first, with their version.
	pub layers: Vec<(Environment, u64)>,
	/// Keys read while rendering templates, transitively.
	pub dependencies: BTreeSet<ConfigKey>,
}

struct Merged {
	value: ConfigValue,
	layers: Vec<(Environment, u64)>,
	schema_version: Option<u32>,
}

/// Computes effective values by walking the environment precedence chain.
///
/// Resolution reads only committed versions and has no side effects, so a
/// caller may drop the future at any point.
pub struct ResolutionEngine {
	store: Arc<VersionStore>,
	encryption: Arc<EncryptionEngine>,
	schemas: Option<Arc<dyn SchemaRegistry>>,
}

impl ResolutionEngine {
	pub fn new(store: Arc<VersionStore>, encryption: Arc<EncryptionEngine>) -> Self {
		Self {
			store,
			encryption,
			schemas: None,
		}
	}

	pub fn with_schemas(mut self, schemas: Arc<dyn SchemaRegistry>) -> Self {
		self.schemas = Some(schemas);
		self
	}

	#[instrument(skip(self), fields(config_id = %key))]
	pub async fn resolve(&self, key: &ConfigKey) -> Result<Resolution> {
		key.validate().map_err(ResolveError::InvalidKey)?;
		self.resolve_with_stack(key.clone(), Vec::new()).await
	}

	fn resolve_with_stack(
		&self,
		key: ConfigKey,
		mut stack: Vec<String>,
	) -> BoxFuture<'_, Result<Resolution>> {
		async move {
			let merged = self
				.merge_layers(&key)
				.await?
				.ok_or_else(|| ResolveError::NotFound(key.config_id()))?;

			stack.push(key.scope());
			let mut dependencies = BTreeSet::new();
			let value = self
				.materialize(&key, merged.value, &stack, &mut dependencies)
				.await?;

			if let Some(version) = merged.schema_version {
				self.validate(&key, version, &value).await?;
			}

			debug!(config_id = %key, layers = merged.layers.len(), "resolved");
			Ok::<_, ResolveError>(Resolution {
				key,
				value,
				layers: merged.layers,
				dependencies,
			})
		}
		.boxed()
	}

	async fn merge_layers(&self, key: &ConfigKey) -> Result<Option<Merged>> {
		let mut acc: Option<ConfigValue> = None;
		let mut layers = Vec::new();
		let mut schema_version = None;

		for environment in key.environment.precedence_chain() {
			let layer_key = key.with_environment(environment);
			let Some(version) = self.store.current(&layer_key).await? else {
				continue;
			};
			if !version.is_active() {
				debug!(config_id = %layer_key, version = version.version_number, "skipping inactive head");
				continue;
			}
			let Some(payload) = version.payload else {
				continue;
			};

			acc = Some(match acc.take() {
				Some(base) => deep_merge(base, payload)?,
				None => payload,
			});
			layers.push((environment, version.version_number));

			if let Some(entry) = self.store.entry(&layer_key).await? {
				if entry.schema_version.is_some() {
					schema_version = entry.schema_version;
				}
			}
		}

		Ok(acc.map(|value| Merged {
			value,
			layers,
			schema_version,
		}))
	}

	fn materialize<'a>(
		&'a self,
		key: &'a ConfigKey,
		value: ConfigValue,
		stack: &'a [String],
		dependencies: &'a mut BTreeSet<ConfigKey>,
	) -> BoxFuture<'a, Result<ResolvedValue>> {
		async move {
			Ok::<_, ResolveError>(match value {
				ConfigValue::Bytes(bytes) => ResolvedValue::Bytes(bytes),
				ConfigValue::String(s) => ResolvedValue::String(s),
				ConfigValue::Integer(i) => ResolvedValue::Integer(i),
				ConfigValue::Float(f) => ResolvedValue::Float(f),
				ConfigValue::Boolean(b) => ResolvedValue::Boolean(b),
				ConfigValue::Array(items) => {
					let mut out = Vec::with_capacity(items.len());
					for item in items {
						out.push(self.materialize(key, item, stack, dependencies).await?);
					}
					ResolvedValue::Array(out)
				}
				ConfigValue::Object(map) => {
					let mut out = std::collections::BTreeMap::new();
					for (name, item) in map {
						let resolved = self.materialize(key, item, stack, dependencies).await?;
						out.insert(name, resolved);
					}
					ResolvedValue::Object(out)
				}
				ConfigValue::Template(text) => {
					ResolvedValue::String(self.render(key, &text, stack, dependencies).await?)
				}
				ConfigValue::Secret(payload) => {
					ResolvedValue::Secret(self.encryption.decrypt(&payload, &key.tenant).await?)
				}
			})
		}
		.boxed()
	}

	async fn render(
		&self,
		key: &ConfigKey,
		text: &str,
		stack: &[String],
		dependencies: &mut BTreeSet<ConfigKey>,
	) -> Result<String> {
		let segments = template::parse(text)?;
		let mut values = HashMap::new();

		for name in template::placeholders(&segments) {
			let sibling = key.sibling(name);
			if stack.contains(&sibling.scope()) {
				return Err(ResolveError::mismatch(
					key.config_id(),
					format!("template cycle through '{name}'"),
				));
			}
			if stack.len() >= MAX_TEMPLATE_DEPTH {
				return Err(ResolveError::mismatch(
					key.config_id(),
					"template nesting too deep",
				));
			}

			let resolution = self
				.resolve_with_stack(sibling.clone(), stack.to_vec())
				.await?;
			let rendered = resolution.value.render_scalar().ok_or_else(|| {
				ResolveError::mismatch(
					key.config_id(),
					format!(
						"placeholder '{name}' is a {}, not a scalar",
						resolution.value.kind_name()
					),
				)
			})?;

			dependencies.extend(resolution.dependencies);
			dependencies.insert(sibling);
			values.insert(name, rendered);
		}

		template::render(&segments, &values)
	}

	async fn validate(&self, key: &ConfigKey, version: u32, value: &ResolvedValue) -> Result<()> {
		let Some(registry) = &self.schemas else {
			return Ok(());
		};
		match registry
			.schema(&key.tenant, &key.namespace, &key.key, version)
			.await
		{
			Some(schema) => schema.validate(value),
			None => Err(ResolveError::mismatch(
				key.config_id(),
				format!("schema version {version} is not registered"),
			)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::schema::{InMemorySchemaRegistry, Schema};
	use std::collections::BTreeMap;
	use tessera_config_core::{ActorId, TenantId, VersionState};
	use tessera_server_config::{CryptoConfig, StoreConfig};
	use tessera_server_db::InMemoryStore;
	use tessera_server_secrets::{CryptoError, KeyHierarchy, LocalKms};

	struct Fixture {
		store: Arc<VersionStore>,
		encryption: Arc<EncryptionEngine>,
		engine: ResolutionEngine,
	}

	fn fixture() -> Fixture {
		let store = Arc::new(VersionStore::new(
			Arc::new(InMemoryStore::new()),
			StoreConfig::default(),
		));
		let hierarchy = KeyHierarchy::new(Arc::new(LocalKms::new()), &CryptoConfig::default());
		let encryption = Arc::new(EncryptionEngine::new(Arc::new(hierarchy)));
		let engine = ResolutionEngine::new(Arc::clone(&store), Arc::clone(&encryption));
		Fixture {
			store,
			encryption,
			engine,
		}
	}

	fn key(name: &str, env: Environment) -> ConfigKey {
		ConfigKey::new("t1", "svc", name, env)
	}

	fn actor() -> ActorId {
		ActorId::new("alice")
	}

	fn object(pairs: &[(&str, ConfigValue)]) -> ConfigValue {
		ConfigValue::Object(
			pairs
				.iter()
				.map(|(k, v)| (k.to_string(), v.clone()))
				.collect(),
		)
	}

	impl Fixture {
		async fn put(&self, key: &ConfigKey, value: ConfigValue) {
			self.store.put(key, value, &actor(), None).await.unwrap();
		}

		async fn put_secret(&self, key: &ConfigKey, plaintext: &str, owner: &str) {
			let payload = self
				.encryption
				.encrypt(plaintext.as_bytes(), &TenantId::new(owner))
				.await
				.unwrap();
			self.put(key, ConfigValue::Secret(payload)).await;
		}
	}

	#[tokio::test]
	async fn higher_layers_override_lower_ones() {
		let f = fixture();
		f.put(
			&key("db", Environment::Global),
			object(&[
				("host", ConfigValue::from("db.internal")),
				("port", ConfigValue::Integer(5432)),
			]),
		)
		.await;
		f.put(
			&key("db", Environment::Production),
			object(&[("port", ConfigValue::Integer(6432))]),
		)
		.await;

		let prod = f.engine.resolve(&key("db", Environment::Production)).await.unwrap();
		let mut expected = BTreeMap::new();
		expected.insert("host".to_string(), ResolvedValue::String("db.internal".into()));
		expected.insert("port".to_string(), ResolvedValue::Integer(6432));
		assert_eq!(prod.value, ResolvedValue::Object(expected));
		assert_eq!(
			prod.layers,
			vec![(Environment::Global, 1), (Environment::Production, 1)]
		);

		let edge = f.engine.resolve(&key("db", Environment::Edge)).await.unwrap();
		assert_eq!(edge.value, prod.value);

		let dev = f.engine.resolve(&key("db", Environment::Development)).await.unwrap();
		assert_eq!(dev.layers, vec![(Environment::Global, 1)]);
	}

	#[tokio::test]
	async fn missing_everywhere_is_not_found() {
		let f = fixture();
		f.put(&key("other", Environment::Global), ConfigValue::Integer(1)).await;
		let err = f
			.engine
			.resolve(&key("absent", Environment::Production))
			.await
			.unwrap_err();
		assert!(matches!(err, ResolveError::NotFound(_)));
	}

	#[tokio::test]
	async fn deleted_layer_falls_back() {
		let f = fixture();
		f.put(&key("timeout", Environment::Global), ConfigValue::Integer(30)).await;
		f.put(&key("timeout", Environment::Staging), ConfigValue::Integer(5)).await;
		f.store
			.delete(&key("timeout", Environment::Staging), &actor(), None)
			.await
			.unwrap();

		let resolved = f
			.engine
			.resolve(&key("timeout", Environment::Staging))
			.await
			.unwrap();
		assert_eq!(resolved.value, ResolvedValue::Integer(30));
	}

	#[tokio::test]
	async fn inactive_head_is_ignored() {
		let f = fixture();
		f.put(&key("flag", Environment::Global), ConfigValue::Boolean(false)).await;
		f.put(&key("flag", Environment::Production), ConfigValue::Boolean(true)).await;
		f.store
			.set_version_state(&key("flag", Environment::Production), 1, VersionState::Inactive)
			.await
			.unwrap();

		let resolved = f
			.engine
			.resolve(&key("flag", Environment::Production))
			.await
			.unwrap();
		assert_eq!(resolved.value, ResolvedValue::Boolean(false));
	}

	#[tokio::test]
	async fn secrets_are_decrypted() {
		let f = fixture();
		let k = key("db_pass", Environment::Production);
		f.put_secret(&k, "pw123", "t1").await;

		let resolved = f.engine.resolve(&k).await.unwrap();
		let secret = resolved.value.as_secret().unwrap();
		assert_eq!(secret.expose().as_slice(), b"pw123");
	}

	#[tokio::test]
	async fn foreign_tenant_envelope_is_rejected() {
		let f = fixture();
		let k = key("db_pass", Environment::Production);
		f.put_secret(&k, "stolen", "t2").await;

		let err = f.engine.resolve(&k).await.unwrap_err();
		assert!(matches!(
			err,
			ResolveError::Crypto(CryptoError::TenantIsolationViolation { .. })
		));
	}

	#[tokio::test]
	async fn templates_render_sibling_scalars() {
		let f = fixture();
		let env = Environment::Production;
		f.put(&key("host", Environment::Global), ConfigValue::from("db")).await;
		f.put(&key("port", env), ConfigValue::Integer(5432)).await;
		f.put(
			&key("url", Environment::Global),
			ConfigValue::Template("postgres://{{host}}:{{port}}".into()),
		)
		.await;

		let resolved = f.engine.resolve(&key("url", env)).await.unwrap();
		assert_eq!(
			resolved.value,
			ResolvedValue::String("postgres://db:5432".into())
		);
		assert!(resolved.dependencies.contains(&key("host", env)));
		assert!(resolved.dependencies.contains(&key("port", env)));
	}

	#[tokio::test]
	async fn template_cycles_fail() {
		let f = fixture();
		let env = Environment::Global;
		f.put(&key("a", env), ConfigValue::Template("{{b}}".into())).await;
		f.put(&key("b", env), ConfigValue::Template("x{{a}}".into())).await;

		let err = f.engine.resolve(&key("a", env)).await.unwrap_err();
		assert!(matches!(err, ResolveError::SchemaMismatch { .. }));
	}

	#[tokio::test]
	async fn deep_template_chains_are_bounded() {
		let f = fixture();
		let env = Environment::Global;
		for i in 0..12 {
			f.put(
				&key(&format!("k{i}"), env),
				ConfigValue::Template(format!("{{{{k{}}}}}", i + 1)),
			)
			.await;
		}
		f.put(&key("k12", env), ConfigValue::from("end")).await;

		let err = f.engine.resolve(&key("k0", env)).await.unwrap_err();
		assert!(matches!(err, ResolveError::SchemaMismatch { .. }));
		let ok = f.engine.resolve(&key("k8", env)).await.unwrap();
		assert_eq!(ok.value, ResolvedValue::String("end".into()));
	}

	#[tokio::test]
	async fn templates_cannot_embed_secrets() {
		let f = fixture();
		let env = Environment::Global;
		f.put_secret(&key("pass", env), "pw", "t1").await;
		f.put(&key("dsn", env), ConfigValue::Template("u:{{pass}}".into())).await;

		let err = f.engine.resolve(&key("dsn", env)).await.unwrap_err();
		assert!(matches!(err, ResolveError::SchemaMismatch { .. }));
	}

	#[tokio::test]
	async fn incompatible_layers_fail_to_merge() {
		let f = fixture();
		f.put(
			&key("hosts", Environment::Global),
			ConfigValue::Array(vec![ConfigValue::from("a")]),
		)
		.await;
		f.put(&key("hosts", Environment::Staging), object(&[])).await;

		let err = f
			.engine
			.resolve(&key("hosts", Environment::Staging))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), tessera_config_core::ErrorKind::SchemaMismatch);
	}

	#[tokio::test]
	async fn declared_schema_is_enforced() {
		let store = Arc::new(VersionStore::new(
			Arc::new(InMemoryStore::new()),
			StoreConfig::default(),
		));
		let hierarchy = KeyHierarchy::new(Arc::new(LocalKms::new()), &CryptoConfig::default());
		let encryption = Arc::new(EncryptionEngine::new(Arc::new(hierarchy)));
		let registry = Arc::new(InMemorySchemaRegistry::new());
		registry
			.register(
				&TenantId::new("t1"),
				"svc",
				"workers",
				1,
				Schema::Integer {
					min: Some(1),
					max: Some(10),
				},
			)
			.await;
		let engine = ResolutionEngine::new(Arc::clone(&store), encryption).with_schemas(registry);

		let k = key("workers", Environment::Global);
		store
			.put_with_schema(&k, ConfigValue::Integer(4), Some(1), &actor(), None)
			.await
			.unwrap();
		assert!(engine.resolve(&k).await.is_ok());

		store
			.put(&k, ConfigValue::Integer(40), &actor(), None)
			.await
			.unwrap();
		let err = engine.resolve(&k).await.unwrap_err();
		assert!(matches!(err, ResolveError::SchemaMismatch { .. }));
	}

	#[tokio::test]
	async fn repeated_resolution_is_identical() {
		let f = fixture();
		f.put(
			&key("cfg", Environment::Global),
			object(&[
				("z", ConfigValue::Integer(1)),
				("a", ConfigValue::Float(0.5)),
				("m", ConfigValue::Array(vec![ConfigValue::Boolean(true)])),
			]),
		)
		.await;
		f.put_secret(&key("cfg_secret", Environment::Global), "s", "t1").await;

		let first = f.engine.resolve(&key("cfg", Environment::Edge)).await.unwrap();
		for _ in 0..5 {
			let again = f.engine.resolve(&key("cfg", Environment::Edge)).await.unwrap();
			assert_eq!(again, first);
		}
	}

	#[tokio::test]
	async fn invalid_keys_are_rejected() {
		let f = fixture();
		let err = f
			.engine
			.resolve(&ConfigKey::new("t1", "svc", "bad key", Environment::Global))
			.await
			.unwrap_err();
		assert!(matches!(err, ResolveError::InvalidKey(_)));
	}
}
